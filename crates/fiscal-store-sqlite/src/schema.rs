//! SQL schema for the fiscal warehouse.
//!
//! [`PRAGMAS`] run on every connection. [`SCHEMA`] runs once, gated on
//! `PRAGMA user_version`; later migrations will be gated on that number too.
//!
//! Money columns hold integer centavos. Quantities and rates hold four
//! decimal places, unit prices ten. Document dates are RFC 3339 strings in
//! the offset the document was issued in, so `substr(data_emissao, 1, 7)`
//! is the local `YYYY-MM` period.

pub const SCHEMA_VERSION: i64 = 1;

/// Per-connection settings; `foreign_keys` is not persisted by SQLite.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
-- ─── Dimensions ──────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS dim_tipo_documento (
    codigo     TEXT PRIMARY KEY,   -- 'NFE' | 'NFSE'
    descricao  TEXT NOT NULL
);

INSERT OR IGNORE INTO dim_tipo_documento (codigo, descricao) VALUES
    ('NFE',  'Nota Fiscal Eletrônica'),
    ('NFSE', 'Nota Fiscal de Serviços Eletrônica');

-- Exactly one of cnpj/cpf is set; emitente_id repeats it so headers can
-- reference either kind through one column.
CREATE TABLE IF NOT EXISTS dim_emitente (
    emitente_id          TEXT PRIMARY KEY,
    cnpj                 CHAR(14) UNIQUE,
    cpf                  CHAR(11) UNIQUE,
    razao_social         TEXT NOT NULL,
    nome_fantasia        TEXT,
    inscricao_estadual   TEXT,
    inscricao_municipal  TEXT,
    regime_tributario    TEXT,
    email                TEXT,
    uf                   CHAR(2),
    codigo_municipio     CHAR(7),
    endereco             TEXT,            -- JSON-encoded Address or NULL
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    CHECK ((cnpj IS NULL) != (cpf IS NULL)),
    CHECK (emitente_id = COALESCE(cnpj, cpf))
);

-- One row per document that names a recipient; not deduplicated.
CREATE TABLE IF NOT EXISTS dim_destinatario (
    destinatario_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    cnpj                CHAR(14),
    cpf                 CHAR(11),
    documento           TEXT,             -- identifier as found, valid or not
    nome                TEXT,
    inscricao_estadual  TEXT,
    email               TEXT,
    uf                  CHAR(2),
    codigo_municipio    CHAR(7),
    endereco            TEXT,
    created_at          TEXT NOT NULL,
    CHECK (cnpj IS NULL OR cpf IS NULL)
);

CREATE TABLE IF NOT EXISTS dim_produtos (
    codigo_produto  TEXT PRIMARY KEY,
    descricao       TEXT NOT NULL,
    ean             TEXT,
    ncm             TEXT,
    cest            TEXT,
    cfop            TEXT,
    unidade         TEXT,
    categoria       TEXT,
    subcategoria    TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_servicos (
    codigo_servico               TEXT PRIMARY KEY,
    descricao                    TEXT NOT NULL,
    cnae                         TEXT,
    codigo_tributacao_nacional   TEXT,
    codigo_tributacao_municipal  TEXT,
    nbs                          TEXT,
    created_at                   TEXT NOT NULL,
    updated_at                   TEXT NOT NULL
);

-- ─── Headers ─────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS nfe_main (
    chave_nfe                  CHAR(44) PRIMARY KEY CHECK (length(chave_nfe) = 44),
    tipo_documento             TEXT NOT NULL DEFAULT 'NFE'
                               REFERENCES dim_tipo_documento(codigo)
                               CHECK (tipo_documento = 'NFE'),
    numero                     TEXT NOT NULL,
    serie                      TEXT NOT NULL,
    modelo                     TEXT NOT NULL,
    natureza_operacao          TEXT,
    tipo_operacao              TEXT,            -- 'inbound' | 'outbound'
    data_emissao               TEXT NOT NULL,
    data_saida_entrada         TEXT,
    protocolo                  TEXT,
    emitente_id                TEXT NOT NULL REFERENCES dim_emitente(emitente_id),
    destinatario_id            INTEGER REFERENCES dim_destinatario(destinatario_id),
    valor_produtos             INTEGER NOT NULL CHECK (valor_produtos >= 0),
    valor_servicos             INTEGER NOT NULL CHECK (valor_servicos >= 0),
    valor_frete                INTEGER NOT NULL CHECK (valor_frete >= 0),
    valor_seguro               INTEGER NOT NULL CHECK (valor_seguro >= 0),
    valor_desconto             INTEGER NOT NULL CHECK (valor_desconto >= 0),
    valor_outros               INTEGER NOT NULL CHECK (valor_outros >= 0),
    base_calculo_icms          INTEGER NOT NULL CHECK (base_calculo_icms >= 0),
    valor_icms                 INTEGER NOT NULL CHECK (valor_icms >= 0),
    base_calculo_icms_st       INTEGER NOT NULL CHECK (base_calculo_icms_st >= 0),
    valor_icms_st              INTEGER NOT NULL CHECK (valor_icms_st >= 0),
    valor_ipi                  INTEGER NOT NULL CHECK (valor_ipi >= 0),
    valor_pis                  INTEGER NOT NULL CHECK (valor_pis >= 0),
    valor_cofins               INTEGER NOT NULL CHECK (valor_cofins >= 0),
    valor_aproximado_tributos  INTEGER NOT NULL CHECK (valor_aproximado_tributos >= 0),
    valor_total_nf             INTEGER NOT NULL CHECK (valor_total_nf >= 0),
    created_at                 TEXT NOT NULL,
    updated_at                 TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS nfse_main (
    id_nfse                        CHAR(53) PRIMARY KEY CHECK (length(id_nfse) = 53),
    tipo_documento                 TEXT NOT NULL DEFAULT 'NFSE'
                                   REFERENCES dim_tipo_documento(codigo)
                                   CHECK (tipo_documento = 'NFSE'),
    numero                         TEXT NOT NULL,
    serie_dps                      TEXT,
    numero_dps                     TEXT,
    data_emissao                   TEXT NOT NULL,
    data_competencia               TEXT,
    codigo_municipio_emissao       CHAR(7),
    codigo_municipio_incidencia    CHAR(7),
    situacao                       TEXT,
    emitente_id                    TEXT NOT NULL REFERENCES dim_emitente(emitente_id),
    destinatario_id                INTEGER REFERENCES dim_destinatario(destinatario_id),
    valor_total_servicos           INTEGER NOT NULL CHECK (valor_total_servicos >= 0),
    valor_deducoes                 INTEGER NOT NULL CHECK (valor_deducoes >= 0),
    valor_desconto_incondicionado  INTEGER NOT NULL CHECK (valor_desconto_incondicionado >= 0),
    base_calculo_issqn             INTEGER NOT NULL CHECK (base_calculo_issqn >= 0),
    aliquota_issqn                 INTEGER NOT NULL CHECK (aliquota_issqn >= 0),
    valor_issqn                    INTEGER NOT NULL CHECK (valor_issqn >= 0),
    issqn_retido                   INTEGER NOT NULL CHECK (issqn_retido IN (0, 1)),
    valor_total_retencoes          INTEGER NOT NULL CHECK (valor_total_retencoes >= 0),
    valor_liquido                  INTEGER NOT NULL CHECK (valor_liquido >= 0),
    created_at                     TEXT NOT NULL,
    updated_at                     TEXT NOT NULL
);

-- ─── Facts ───────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS fact_itens_nfe (
    item_id              INTEGER PRIMARY KEY AUTOINCREMENT,
    chave_nfe            CHAR(44) NOT NULL REFERENCES nfe_main(chave_nfe),
    numero_item          INTEGER NOT NULL CHECK (numero_item > 0),
    codigo_produto       TEXT NOT NULL REFERENCES dim_produtos(codigo_produto),
    cfop                 TEXT,
    unidade              TEXT,
    quantidade           INTEGER NOT NULL CHECK (quantidade >= 0),
    valor_unitario       INTEGER NOT NULL CHECK (valor_unitario >= 0),
    valor_bruto          INTEGER NOT NULL CHECK (valor_bruto >= 0),
    valor_desconto       INTEGER NOT NULL CHECK (valor_desconto >= 0),
    valor_frete          INTEGER NOT NULL CHECK (valor_frete >= 0),
    cst_icms             TEXT,
    base_icms            INTEGER NOT NULL,
    aliquota_icms        INTEGER NOT NULL,
    valor_icms           INTEGER NOT NULL CHECK (valor_icms >= 0),
    cst_icms_st          TEXT,
    base_icms_st         INTEGER NOT NULL,
    aliquota_icms_st     INTEGER NOT NULL,
    valor_icms_st        INTEGER NOT NULL CHECK (valor_icms_st >= 0),
    cst_ipi              TEXT,
    base_ipi             INTEGER NOT NULL,
    aliquota_ipi         INTEGER NOT NULL,
    valor_ipi            INTEGER NOT NULL CHECK (valor_ipi >= 0),
    cst_pis              TEXT,
    base_pis             INTEGER NOT NULL,
    aliquota_pis         INTEGER NOT NULL,
    valor_pis            INTEGER NOT NULL CHECK (valor_pis >= 0),
    cst_cofins           TEXT,
    base_cofins          INTEGER NOT NULL,
    aliquota_cofins      INTEGER NOT NULL,
    valor_cofins         INTEGER NOT NULL CHECK (valor_cofins >= 0),
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    UNIQUE (chave_nfe, numero_item)
);

CREATE TABLE IF NOT EXISTS fact_servicos_nfse (
    servico_item_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    id_nfse          CHAR(53) NOT NULL REFERENCES nfse_main(id_nfse),
    numero_linha     INTEGER NOT NULL CHECK (numero_linha > 0),
    codigo_servico   TEXT NOT NULL REFERENCES dim_servicos(codigo_servico),
    discriminacao    TEXT,
    quantidade       INTEGER NOT NULL CHECK (quantidade >= 0),
    valor_servico    INTEGER NOT NULL CHECK (valor_servico >= 0),
    cst_issqn        TEXT,
    base_issqn       INTEGER NOT NULL,
    aliquota_issqn   INTEGER NOT NULL,
    valor_issqn      INTEGER NOT NULL CHECK (valor_issqn >= 0),
    issqn_retido     INTEGER NOT NULL CHECK (issqn_retido IN (0, 1)),
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (id_nfse, numero_linha)
);

-- Events are strictly append-only.
CREATE TABLE IF NOT EXISTS nfe_eventos (
    evento_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    chave_nfe      CHAR(44) NOT NULL REFERENCES nfe_main(chave_nfe),
    tipo_evento    TEXT NOT NULL,
    sequencia      INTEGER NOT NULL CHECK (sequencia > 0),
    data_evento    TEXT NOT NULL,
    descricao      TEXT,
    justificativa  TEXT,
    protocolo      TEXT,
    recorded_at    TEXT NOT NULL,
    UNIQUE (chave_nfe, tipo_evento, sequencia)
);

-- ─── Ingestion ledger ────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS ingest_jobs (
    job_id        TEXT PRIMARY KEY,
    file_name     TEXT NOT NULL,
    digest        TEXT NOT NULL,
    status        TEXT NOT NULL,
    failed_stage  TEXT,
    error         TEXT,
    payload_kind  TEXT,
    document_id   TEXT,
    duplicate_of  TEXT REFERENCES ingest_jobs(job_id),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- ─── Views ───────────────────────────────────────────────────────────────

-- One row per header of either table. Inner joins are safe: emitente_id is
-- a NOT NULL foreign key on both headers.
CREATE VIEW IF NOT EXISTS vw_documentos_unificados AS
SELECT 'NFE'                          AS tipo_documento,
       n.chave_nfe                    AS documento_id,
       n.numero                       AS numero,
       n.emitente_id                  AS emitente_id,
       e.razao_social                 AS razao_social,
       n.data_emissao                 AS data_emissao,
       substr(n.data_emissao, 1, 7)   AS periodo,
       n.valor_total_nf               AS valor_total,
       n.valor_icms + n.valor_icms_st + n.valor_ipi
         + n.valor_pis + n.valor_cofins AS valor_impostos,
       EXISTS (
         SELECT 1 FROM nfe_eventos ev
         WHERE ev.chave_nfe = n.chave_nfe
           AND ev.tipo_evento IN ('110111', '110112')
       )                              AS cancelado
FROM nfe_main n
JOIN dim_emitente e ON e.emitente_id = n.emitente_id
UNION ALL
SELECT 'NFSE',
       s.id_nfse,
       s.numero,
       s.emitente_id,
       e.razao_social,
       s.data_emissao,
       substr(s.data_emissao, 1, 7),
       s.valor_total_servicos,
       s.valor_issqn,
       0
FROM nfse_main s
JOIN dim_emitente e ON e.emitente_id = s.emitente_id;

CREATE VIEW IF NOT EXISTS vw_resumo_fornecedores AS
SELECT e.emitente_id,
       e.razao_social,
       e.nome_fantasia,
       e.uf,
       SUM(u.tipo_documento = 'NFE')   AS qtd_nfe,
       SUM(u.tipo_documento = 'NFSE')  AS qtd_nfse,
       MIN(u.data_emissao)             AS primeira_emissao,
       MAX(u.data_emissao)             AS ultima_emissao,
       SUM(u.valor_total)              AS valor_total,
       SUM(u.valor_impostos)           AS valor_impostos
FROM dim_emitente e
JOIN vw_documentos_unificados u ON u.emitente_id = e.emitente_id
GROUP BY e.emitente_id;

CREATE VIEW IF NOT EXISTS vw_produtos_mais_comprados AS
SELECT p.codigo_produto,
       p.descricao,
       p.ncm,
       p.categoria,
       SUM(i.quantidade)            AS quantidade_total,
       SUM(i.valor_bruto)           AS valor_total,
       COUNT(DISTINCT i.chave_nfe)  AS qtd_documentos,
       COUNT(*)                     AS qtd_itens
FROM dim_produtos p
JOIN fact_itens_nfe i ON i.codigo_produto = p.codigo_produto
GROUP BY p.codigo_produto;

CREATE VIEW IF NOT EXISTS vw_analise_impostos_periodo AS
WITH nfe AS (
    SELECT substr(data_emissao, 1, 7)  AS periodo,
           COUNT(*)                    AS qtd_nfe,
           SUM(valor_total_nf)         AS total_nfe,
           SUM(valor_icms)             AS icms,
           SUM(valor_icms_st)          AS icms_st,
           SUM(valor_ipi)              AS ipi,
           SUM(valor_pis)              AS pis,
           SUM(valor_cofins)           AS cofins
    FROM nfe_main
    GROUP BY 1
), nfse AS (
    SELECT substr(data_emissao, 1, 7)  AS periodo,
           COUNT(*)                    AS qtd_nfse,
           SUM(valor_total_servicos)   AS total_nfse,
           SUM(valor_issqn)            AS issqn
    FROM nfse_main
    GROUP BY 1
), periodos AS (
    SELECT periodo FROM nfe
    UNION
    SELECT periodo FROM nfse
)
SELECT p.periodo,
       COALESCE(nfe.qtd_nfe, 0)       AS qtd_nfe,
       COALESCE(nfe.total_nfe, 0)     AS total_nfe,
       COALESCE(nfe.icms, 0)          AS icms,
       COALESCE(nfe.icms_st, 0)       AS icms_st,
       COALESCE(nfe.ipi, 0)           AS ipi,
       COALESCE(nfe.pis, 0)           AS pis,
       COALESCE(nfe.cofins, 0)        AS cofins,
       COALESCE(nfse.qtd_nfse, 0)     AS qtd_nfse,
       COALESCE(nfse.total_nfse, 0)   AS total_nfse,
       COALESCE(nfse.issqn, 0)        AS issqn,
       COALESCE(nfe.total_nfe, 0) + COALESCE(nfse.total_nfse, 0) AS total_geral
FROM periodos p
LEFT JOIN nfe  ON nfe.periodo  = p.periodo
LEFT JOIN nfse ON nfse.periodo = p.periodo;

-- ─── Indexes ─────────────────────────────────────────────────────────────

CREATE INDEX IF NOT EXISTS nfe_main_emissao_idx         ON nfe_main(data_emissao);
CREATE INDEX IF NOT EXISTS nfe_main_emitente_idx        ON nfe_main(emitente_id);
CREATE INDEX IF NOT EXISTS nfse_main_emissao_idx        ON nfse_main(data_emissao);
CREATE INDEX IF NOT EXISTS nfse_main_emitente_idx       ON nfse_main(emitente_id);
CREATE INDEX IF NOT EXISTS fact_itens_nfe_chave_idx     ON fact_itens_nfe(chave_nfe);
CREATE INDEX IF NOT EXISTS fact_itens_nfe_produto_idx   ON fact_itens_nfe(codigo_produto);
CREATE INDEX IF NOT EXISTS fact_servicos_nfse_id_idx    ON fact_servicos_nfse(id_nfse);
CREATE INDEX IF NOT EXISTS fact_servicos_nfse_cod_idx   ON fact_servicos_nfse(codigo_servico);
CREATE INDEX IF NOT EXISTS nfe_eventos_chave_idx        ON nfe_eventos(chave_nfe);
CREATE INDEX IF NOT EXISTS ingest_jobs_digest_idx       ON ingest_jobs(digest);
CREATE INDEX IF NOT EXISTS ingest_jobs_created_idx      ON ingest_jobs(created_at);

PRAGMA user_version = 1;
";
