//! A small owned element tree built from `quick-xml` events, and [`Node`],
//! a path-aware view over it used by the document mappers.
//!
//! Namespace prefixes are dropped; fiscal layouts never reuse a local name
//! across namespaces inside one document.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use crate::error::{Error, Result};

// ─── Element ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Element {
  pub name:     String,
  pub attrs:    Vec<(String, String)>,
  pub text:     String,
  pub children: Vec<Element>,
}

impl Element {
  fn open(start: &BytesStart<'_>) -> Result<Self> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
      let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
      let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
      let value = attr
        .unescape_value()
        .map_err(|e| Error::Xml(e.to_string()))?
        .into_owned();
      attrs.push((key, value));
    }
    Ok(Self { name, attrs, ..Default::default() })
  }

  pub fn child(&self, name: &str) -> Option<&Element> {
    self.children.iter().find(|c| c.name == name)
  }

  pub fn children<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
    self.children.iter().filter(move |c| c.name == name)
  }

  pub fn attr(&self, name: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

/// Parse a whole document into its root element.
pub fn parse(xml: &[u8]) -> Result<Element> {
  let mut reader = quick_xml::Reader::from_reader(xml);
  reader.config_mut().trim_text(true);

  let mut stack: Vec<Element> = Vec::new();
  let mut root: Option<Element> = None;
  let mut buf = Vec::new();

  loop {
    match reader.read_event_into(&mut buf) {
      Ok(Event::Start(ref e)) => stack.push(Element::open(e)?),
      Ok(Event::Empty(ref e)) => {
        let el = Element::open(e)?;
        attach(&mut stack, &mut root, el)?;
      }
      Ok(Event::End(_)) => {
        let el = stack
          .pop()
          .ok_or_else(|| Error::Xml("unbalanced end tag".into()))?;
        attach(&mut stack, &mut root, el)?;
      }
      Ok(Event::Text(ref t)) => {
        if let Some(top) = stack.last_mut() {
          let text = t.unescape().map_err(|e| Error::Xml(e.to_string()))?;
          top.text.push_str(&text);
        }
      }
      Ok(Event::CData(ref c)) => {
        if let Some(top) = stack.last_mut() {
          top.text.push_str(&String::from_utf8_lossy(c));
        }
      }
      Ok(Event::Eof) => break,
      Err(e) => return Err(Error::Xml(e.to_string())),
      _ => {}
    }
    buf.clear();
  }

  if !stack.is_empty() {
    return Err(Error::Xml("unexpected end of document".into()));
  }
  root.ok_or_else(|| Error::Xml("document has no root element".into()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
  match stack.last_mut() {
    Some(parent) => parent.children.push(el),
    None if root.is_none() => *root = Some(el),
    None => return Err(Error::Xml("more than one root element".into())),
  }
  Ok(())
}

// ─── Node ────────────────────────────────────────────────────────────────────

/// An element plus the path it was reached by, so mapping errors can name
/// the exact location (`infNFe/det[2]/prod/vProd`).
#[derive(Debug, Clone)]
pub struct Node<'a> {
  el:   &'a Element,
  path: String,
}

impl<'a> Node<'a> {
  pub fn root(el: &'a Element) -> Self {
    Self { el, path: el.name.clone() }
  }

  pub fn name(&self) -> &str { &self.el.name }

  pub fn path(&self) -> &str { &self.path }

  fn join(&self, rel: &str) -> String { format!("{}/{rel}", self.path) }

  /// Follow a `/`-separated relative path.
  pub fn at(&self, rel: &str) -> Option<Node<'a>> {
    let mut el = self.el;
    for step in rel.split('/') {
      el = el.child(step)?;
    }
    Some(Node { el, path: self.join(rel) })
  }

  pub fn req(&self, rel: &str) -> Result<Node<'a>> {
    self
      .at(rel)
      .ok_or_else(|| Error::MissingElement(self.join(rel)))
  }

  /// First of several alternative relative paths that exists.
  pub fn any(&self, rels: &[&str]) -> Option<Node<'a>> {
    rels.iter().find_map(|rel| self.at(rel))
  }

  /// All direct children with the given name.
  pub fn all(&self, name: &str) -> Vec<Node<'a>> {
    self
      .el
      .children(name)
      .enumerate()
      .map(|(i, el)| Node { el, path: format!("{}/{name}[{}]", self.path, i + 1) })
      .collect()
  }

  /// The first child element, whatever its name. Tax groups such as
  /// `ICMS/ICMS00` or `PIS/PISNT` are selected this way.
  pub fn first_child(&self) -> Option<Node<'a>> {
    self.el.children.first().map(|el| Node {
      el,
      path: format!("{}/{}", self.path, el.name),
    })
  }

  pub fn attr(&self, name: &str) -> Option<&'a str> { self.el.attr(name) }

  pub fn own_text(&self) -> Option<&'a str> {
    let t = self.el.text.trim();
    (!t.is_empty()).then_some(t)
  }

  // ── Typed leaves ──────────────────────────────────────────────────────────

  pub fn text(&self, rel: &str) -> Option<String> {
    self.at(rel)?.own_text().map(str::to_owned)
  }

  pub fn req_text(&self, rel: &str) -> Result<String> {
    self
      .text(rel)
      .ok_or_else(|| Error::MissingElement(self.join(rel)))
  }

  pub fn opt_decimal(&self, rel: &str) -> Result<Option<Decimal>> {
    let Some(node) = self.at(rel) else {
      return Ok(None);
    };
    let Some(raw) = node.own_text() else {
      return Ok(None);
    };
    Decimal::from_str(raw)
      .map(Some)
      .map_err(|_| invalid(&node.path, raw))
  }

  /// A monetary or quantity leaf; absent means zero.
  pub fn decimal(&self, rel: &str) -> Result<Decimal> {
    Ok(self.opt_decimal(rel)?.unwrap_or_default())
  }

  pub fn datetime(&self, rel: &str) -> Result<Option<DateTime<FixedOffset>>> {
    let Some(node) = self.at(rel) else {
      return Ok(None);
    };
    let Some(raw) = node.own_text() else {
      return Ok(None);
    };
    parse_datetime(raw)
      .map(Some)
      .ok_or_else(|| invalid(&node.path, raw))
  }

  pub fn date(&self, rel: &str) -> Result<Option<NaiveDate>> {
    let Some(node) = self.at(rel) else {
      return Ok(None);
    };
    let Some(raw) = node.own_text() else {
      return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
      .map(Some)
      .map_err(|_| invalid(&node.path, raw))
  }

  pub fn number(&self, rel: &str) -> Result<Option<u32>> {
    let Some(node) = self.at(rel) else {
      return Ok(None);
    };
    let Some(raw) = node.own_text() else {
      return Ok(None);
    };
    raw.parse().map(Some).map_err(|_| invalid(&node.path, raw))
  }
}

pub(crate) fn invalid(path: &str, value: &str) -> Error {
  Error::InvalidValue { path: path.to_owned(), value: value.to_owned() }
}

/// Brasília standard time, used for date-only layouts.
fn brasilia() -> Option<FixedOffset> { FixedOffset::west_opt(3 * 3600) }

/// RFC 3339 timestamps as written by the authorisers, or a bare date
/// (pre-4.00 `dEmi`) read as midnight in Brasília.
fn parse_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt);
  }
  let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
  date.and_hms_opt(0, 0, 0)?.and_local_timezone(brasilia()?).single()
}
