//! NF-e lifecycle events (cancellation, correction letter, recipient
//! manifestation). Append-only; an event is identified by
//! `(key, event type, sequence)`.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, ids::NfeKey, item::positive};

/// The `tpEvento` code of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventType {
  /// 110110: Carta de Correção.
  CorrectionLetter,
  /// 110111: Cancelamento.
  Cancellation,
  /// 110112: Cancelamento por substituição.
  CancellationBySubstitution,
  /// 210200: Confirmação da Operação.
  OperationConfirmed,
  /// 210210: Ciência da Operação.
  OperationAcknowledged,
  /// 210220: Desconhecimento da Operação.
  OperationUnknown,
  /// 210240: Operação não Realizada.
  OperationNotPerformed,
  Other(String),
}

impl EventType {
  pub fn code(&self) -> &str {
    match self {
      Self::CorrectionLetter => "110110",
      Self::Cancellation => "110111",
      Self::CancellationBySubstitution => "110112",
      Self::OperationConfirmed => "210200",
      Self::OperationAcknowledged => "210210",
      Self::OperationUnknown => "210220",
      Self::OperationNotPerformed => "210240",
      Self::Other(code) => code,
    }
  }

  pub fn from_code(code: &str) -> Self {
    match code {
      "110110" => Self::CorrectionLetter,
      "110111" => Self::Cancellation,
      "110112" => Self::CancellationBySubstitution,
      "210200" => Self::OperationConfirmed,
      "210210" => Self::OperationAcknowledged,
      "210220" => Self::OperationUnknown,
      "210240" => Self::OperationNotPerformed,
      other => Self::Other(other.to_owned()),
    }
  }

  pub fn cancels(&self) -> bool {
    matches!(self, Self::Cancellation | Self::CancellationBySubstitution)
  }
}

impl From<EventType> for String {
  fn from(t: EventType) -> Self { t.code().to_owned() }
}

impl From<String> for EventType {
  fn from(code: String) -> Self { Self::from_code(&code) }
}

/// An event as parsed, before it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentEvent {
  pub key:           NfeKey,
  pub event_type:    EventType,
  /// `nSeqEvento`; starts at 1 for each (key, type).
  pub sequence:      u32,
  pub occurred_at:   DateTime<FixedOffset>,
  pub description:   Option<String>,
  /// `xJust` for cancellations, `xCorrecao` for correction letters.
  pub justification: Option<String>,
  pub protocol:      Option<String>,
}

impl NewDocumentEvent {
  pub fn validate(&self) -> Result<()> { positive("sequence", self.sequence) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEvent {
  pub event_id:    i64,
  #[serde(flatten)]
  pub event:       NewDocumentEvent,
  /// Server-assigned; never changes after creation.
  pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;
  use crate::Error;

  fn cancellation(sequence: u32) -> NewDocumentEvent {
    NewDocumentEvent {
      key: NfeKey::parse("35240311222333000181550010000000011000000015").unwrap(),
      event_type: EventType::Cancellation,
      sequence,
      occurred_at: FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 16, 9, 0, 0)
        .unwrap(),
      description: Some("Cancelamento".into()),
      justification: Some("Erro na emissao da nota".into()),
      protocol: None,
    }
  }

  #[test]
  fn sequence_starts_at_one() {
    cancellation(1).validate().unwrap();
    match cancellation(0).validate().unwrap_err() {
      Error::ZeroNumber { field } => assert_eq!(field, "sequence"),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn event_codes_round_trip() {
    assert_eq!(EventType::from_code("110111"), EventType::Cancellation);
    assert!(EventType::from_code("110112").cancels());
    assert!(!EventType::CorrectionLetter.cancels());
    assert_eq!(EventType::from_code("999999").code(), "999999");
  }
}
