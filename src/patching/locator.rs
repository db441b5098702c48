//! Field-scoped numeric substitution in the game's configuration grammar.
//!
//! The grammar is line oriented:
//!
//! ```text
//! DefaultWeightParams : struct.begin {refkey=[0]}
//!    MaxInventoryMass = 80
//!    WeightEffectParams : struct.begin
//!       [0] : struct.begin
//!          Threshold = 80.f
//!       struct.end
//!    struct.end
//! struct.end
//! ```
//!
//! A [`FieldLocator`] names a field and the [`Scope`] it is searched in. Only the
//! numeric literal of a match is rewritten; everything else in the document, including
//! the literal's float-marker style (`90.f`, `4.5f`, `12`), is preserved.

use regex::Regex;
use std::ops::Range;
use thiserror::Error;

/// One `Name : struct.begin … struct.end` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpan {
    pub name: String,
    /// Raw text between `{` and `}` on the header line
    pub attributes: Option<String>,
    /// Nesting depth, 0 for top-level records
    pub depth: usize,
    /// Offset of the header line
    pub start: usize,
    /// Lines between the header and the closing `struct.end`
    pub body: Range<usize>,
    /// Offset just past the closing line
    pub end: usize,
}

impl RecordSpan {
    /// Whether the header carries `attribute` as one of its `;`-separated entries
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .as_deref()
            .is_some_and(|attrs| attrs.split(';').any(|a| a.trim() == attribute))
    }
}

fn header_pattern() -> Regex {
    Regex::new(r"^[ \t]*([^\s:]+)[ \t]*:[ \t]*struct\.begin(?:[ \t]*\{([^}\r\n]*)\})?")
        .expect("Invalid record header regex")
}

/// Find every record in `text`, ordered by position.
///
/// Unterminated records are closed at the end of the text.
pub fn scan_records(text: &str) -> Vec<RecordSpan> {
    let header = header_pattern();
    let mut open: Vec<(String, Option<String>, usize, usize)> = Vec::new();
    let mut records = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if let Some(caps) = header.captures(line) {
            open.push((
                caps[1].to_string(),
                caps.get(2).map(|m| m.as_str().trim().to_string()),
                line_start,
                offset,
            ));
        } else if line.trim_start().starts_with("struct.end") {
            if let Some((name, attributes, start, body_start)) = open.pop() {
                records.push(RecordSpan {
                    name,
                    attributes,
                    depth: open.len(),
                    start,
                    body: body_start..line_start,
                    end: offset,
                });
            }
        }
    }

    while let Some((name, attributes, start, body_start)) = open.pop() {
        records.push(RecordSpan {
            name,
            attributes,
            depth: open.len(),
            start,
            body: body_start..text.len(),
            end: text.len(),
        });
    }

    records.sort_by_key(|r| r.start);
    records
}

/// Where a field is searched for
#[derive(Debug, Clone)]
pub enum Scope {
    /// Every occurrence in the document
    Document,
    /// Inside records with this name, at any depth
    Record(String),
    /// First occurrence after each anchor match, limited to the innermost
    /// record enclosing the anchor
    AfterAnchor(Regex),
    /// Inside top-level records, optionally filtered by a header attribute and
    /// excluding records by name
    TopLevelRecords {
        attribute: Option<String>,
        exclude: Vec<String>,
    },
}

/// Locates a numeric field inside a scope
#[derive(Debug, Clone)]
pub struct FieldLocator {
    field: String,
    scope: Scope,
    pattern: Regex,
}

impl FieldLocator {
    pub fn new(field: &str, scope: Scope) -> Self {
        let pattern = Regex::new(&format!(
            r"\b{}[ \t]*=[ \t]*(-?\d+)(\.\d*)?(f?)",
            regex::escape(field)
        ))
        .expect("Invalid field regex");

        Self {
            field: field.to_string(),
            scope,
            pattern,
        }
    }

    pub fn document(field: &str) -> Self {
        Self::new(field, Scope::Document)
    }

    pub fn in_record(field: &str, record: &str) -> Self {
        Self::new(field, Scope::Record(record.to_string()))
    }

    /// # Panics
    /// If `anchor` is not a valid regex
    pub fn after_anchor(field: &str, anchor: &str) -> Self {
        let anchor = Regex::new(anchor).expect("Invalid anchor regex");
        Self::new(field, Scope::AfterAnchor(anchor))
    }

    pub fn in_top_level_records(field: &str, attribute: Option<&str>, exclude: &[&str]) -> Self {
        Self::new(
            field,
            Scope::TopLevelRecords {
                attribute: attribute.map(str::to_string),
                exclude: exclude.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Byte ranges of `text` to search, with whether only the first match counts
    fn search_ranges(&self, text: &str) -> (Vec<Range<usize>>, bool) {
        match &self.scope {
            Scope::Document => (vec![0..text.len()], false),
            Scope::Record(name) => (
                scan_records(text)
                    .into_iter()
                    .filter(|r| &r.name == name)
                    .map(|r| r.body)
                    .collect(),
                false,
            ),
            Scope::AfterAnchor(anchor) => {
                let records = scan_records(text);
                let ranges = anchor
                    .find_iter(text)
                    .map(|m| {
                        let limit = records
                            .iter()
                            .filter(|r| r.body.start <= m.start() && m.start() < r.body.end)
                            .max_by_key(|r| r.depth)
                            .map_or(text.len(), |r| r.body.end);
                        m.end()..limit.max(m.end())
                    })
                    .collect();
                (ranges, true)
            }
            Scope::TopLevelRecords { attribute, exclude } => (
                scan_records(text)
                    .into_iter()
                    .filter(|r| r.depth == 0)
                    .filter(|r| attribute.as_deref().is_none_or(|a| r.has_attribute(a)))
                    .filter(|r| !exclude.iter().any(|e| e == &r.name))
                    .map(|r| r.body)
                    .collect(),
                false,
            ),
        }
    }

    /// All literal occurrences of the field within scope, in document order
    pub fn find(&self, text: &str) -> Vec<Literal> {
        let (ranges, first_only) = self.search_ranges(text);
        let mut found: Vec<Literal> = Vec::new();

        for range in ranges {
            let haystack = &text[range.clone()];
            for caps in self.pattern.captures_iter(haystack) {
                let (Some(int_part), Some(whole)) = (caps.get(1), caps.get(0)) else {
                    continue;
                };
                let fraction = caps.get(2).map(|m| m.as_str());
                let marker = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
                let value_end = range.start + whole.end();
                let value_start = range.start + int_part.start();

                if !found.iter().any(|l| l.range.start == value_start) {
                    found.push(Literal {
                        range: value_start..value_end,
                        value: parse_literal(int_part.as_str(), fraction),
                        style: LiteralStyle {
                            fraction_digits: fraction.map(|f| f.len() - 1),
                            float_marker: marker,
                        },
                    });
                }
                if first_only {
                    break;
                }
            }
        }

        found.sort_by_key(|l| l.range.start);
        found
    }
}

fn parse_literal(int_part: &str, fraction: Option<&str>) -> f64 {
    let digits = match fraction {
        Some(f) if f.len() > 1 => format!("{}{}", int_part, f),
        _ => int_part.to_string(),
    };
    digits.parse().unwrap_or(0.0)
}

/// How a numeric literal was written in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralStyle {
    /// `None` without a decimal point, `Some(0)` for `90.`
    pub fraction_digits: Option<usize>,
    pub float_marker: bool,
}

impl LiteralStyle {
    /// Render `value` the way the original literal was written
    pub fn render(&self, value: f64) -> String {
        debug_assert!(value.is_finite(), "refusing to render non-finite value {}", value);
        let marker = if self.float_marker { "f" } else { "" };
        if value.fract() == 0.0 && value.abs() < 1e15 {
            let whole = value as i64;
            return match self.fraction_digits {
                None => format!("{}{}", whole, marker),
                Some(0) => format!("{}.{}", whole, marker),
                Some(_) => format!("{}.0{}", whole, marker),
            };
        }
        format!("{}{}", value, marker)
    }
}

/// One numeric literal found by a locator
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub range: Range<usize>,
    pub value: f64,
    pub style: LiteralStyle,
}

/// Fewer occurrences than values for a positional field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected} occurrences of {field}, found {found}")]
pub struct PositionalMismatch {
    pub field: String,
    pub expected: usize,
    pub found: usize,
}

/// Result of a positional replacement that did go ahead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalOutcome {
    pub replaced: usize,
    pub found: usize,
    /// The original values were not in descending order
    pub out_of_order: bool,
}

impl PositionalOutcome {
    /// More occurrences than values; the extras were left alone
    pub fn has_extra(&self) -> bool {
        self.found > self.replaced
    }
}

/// A configuration file being edited in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    text: String,
}

impl ConfigDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Set every in-scope occurrence of the field to `value`.
    ///
    /// # Returns
    /// The number of literals replaced
    pub fn set_field(&mut self, locator: &FieldLocator, value: f64) -> usize {
        self.map_field(locator, |_| value)
    }

    /// Rewrite every in-scope occurrence of the field through `f`
    pub fn map_field(&mut self, locator: &FieldLocator, f: impl Fn(f64) -> f64) -> usize {
        let literals = locator.find(&self.text);
        for literal in literals.iter().rev() {
            let rendered = literal.style.render(f(literal.value));
            tracing::debug!(
                "{}: {} -> {}",
                locator.field(),
                &self.text[literal.range.clone()],
                rendered
            );
            self.text.replace_range(literal.range.clone(), &rendered);
        }
        literals.len()
    }

    /// Replace the Nth occurrence of the field with `values[N]`.
    ///
    /// Leaves the document untouched when there are fewer occurrences than values.
    pub fn set_positional(
        &mut self,
        locator: &FieldLocator,
        values: &[f64],
    ) -> Result<PositionalOutcome, PositionalMismatch> {
        let literals = locator.find(&self.text);
        if literals.len() < values.len() {
            return Err(PositionalMismatch {
                field: locator.field().to_string(),
                expected: values.len(),
                found: literals.len(),
            });
        }

        let out_of_order = literals
            .windows(2)
            .take(values.len().saturating_sub(1))
            .any(|pair| pair[0].value < pair[1].value);

        for (literal, value) in literals.iter().zip(values).rev() {
            let rendered = literal.style.render(*value);
            self.text.replace_range(literal.range.clone(), &rendered);
        }

        Ok(PositionalOutcome {
            replaced: values.len(),
            found: literals.len(),
            out_of_order,
        })
    }
}

/// Render a value with at least one fractional digit (`5.0`, `2.5`)
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHT: &str = "\
[0] : struct.begin
   SID = Empty
   MaxInventoryMass = 0.f
struct.end

DefaultWeightParams : struct.begin {refkey=[0]}
   SID = DefaultWeightParams
   MaxInventoryMass = 80
   InventoryPenaltyLessWeight = 69.99
   WeightEffectParams : struct.begin
      [0] : struct.begin
         Threshold = 80.f
      struct.end
      [1] : struct.begin
         Threshold = 75.f
      struct.end
   struct.end
struct.end
";

    #[test]
    fn test_scan_records_nesting() {
        let records = scan_records(WEIGHT);
        let names: Vec<_> = records.iter().map(|r| (r.name.as_str(), r.depth)).collect();
        assert_eq!(
            names,
            vec![
                ("[0]", 0),
                ("DefaultWeightParams", 0),
                ("WeightEffectParams", 1),
                ("[0]", 2),
                ("[1]", 2)
            ]
        );
        assert!(records[1].has_attribute("refkey=[0]"));
        assert!(!records[0].has_attribute("refkey=[0]"));
    }

    #[test]
    fn test_record_scope_leaves_other_records() {
        let mut doc = ConfigDocument::new(WEIGHT);
        let locator = FieldLocator::in_record("MaxInventoryMass", "DefaultWeightParams");

        assert_eq!(doc.set_field(&locator, 300.0), 1);
        assert!(doc.as_str().contains("MaxInventoryMass = 0.f"));
        assert!(doc.as_str().contains("MaxInventoryMass = 300\n"));
    }

    #[test]
    fn test_literal_style_preserved() {
        let style = |fraction_digits, float_marker| LiteralStyle {
            fraction_digits,
            float_marker,
        };
        assert_eq!(style(Some(0), true).render(260.0), "260.f");
        assert_eq!(style(Some(1), true).render(4.0), "4.0f");
        assert_eq!(style(Some(1), true).render(0.25), "0.25f");
        assert_eq!(style(None, false).render(12.0), "12");
        assert_eq!(style(Some(2), false).render(439.99), "439.99");
    }

    #[test]
    fn test_field_name_must_match_whole_word() {
        let mut doc = ConfigDocument::new("PenaltyMaxValue = 5\nMaxValue = 6\n");
        assert_eq!(doc.set_field(&FieldLocator::document("MaxValue"), 9.0), 1);
        assert_eq!(doc.as_str(), "PenaltyMaxValue = 5\nMaxValue = 9\n");
    }

    #[test]
    fn test_after_anchor_stays_in_enclosing_record() {
        let text = "\
[0] : struct.begin
   EffectSID = EEffectType::PenaltyLessWeight
struct.end
[1] : struct.begin
   EffectSID = EEffectType::RegenStamina
   MaxValue = 30.f
struct.end
";
        let mut doc = ConfigDocument::new(text);
        let locator =
            FieldLocator::after_anchor("MaxValue", r"EffectSID\s*=\s*EEffectType::PenaltyLessWeight");
        assert_eq!(doc.set_field(&locator, 99999.0), 0);
        assert_eq!(doc.as_str(), text);
    }

    #[test]
    fn test_positional_replacement() {
        let mut doc = ConfigDocument::new(WEIGHT);
        let locator = FieldLocator::document("Threshold");

        let outcome = doc.set_positional(&locator, &[300.0, 290.0]).unwrap();
        assert_eq!(outcome.replaced, 2);
        assert!(!outcome.has_extra());
        assert!(!outcome.out_of_order);
        assert!(doc.as_str().contains("Threshold = 300.f"));
        assert!(doc.as_str().contains("Threshold = 290.f"));
    }

    #[test]
    fn test_positional_too_few_leaves_text() {
        let mut doc = ConfigDocument::new(WEIGHT);
        let err = doc
            .set_positional(&FieldLocator::document("Threshold"), &[1.0, 2.0, 3.0, 4.0])
            .unwrap_err();
        assert_eq!(err.found, 2);
        assert_eq!(doc.as_str(), WEIGHT);
    }

    #[test]
    fn test_positional_flags_ascending_source() {
        let mut doc = ConfigDocument::new("Threshold = 10.f\nThreshold = 20.f\nThreshold = 5.f\n");
        let outcome = doc
            .set_positional(&FieldLocator::document("Threshold"), &[3.0, 2.0])
            .unwrap();
        assert!(outcome.out_of_order);
        assert!(outcome.has_extra());
        assert_eq!(doc.as_str(), "Threshold = 3.f\nThreshold = 2.f\nThreshold = 5.f\n");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(5.0), "5.0");
        assert_eq!(format_decimal(2.5), "2.5");
    }
}
