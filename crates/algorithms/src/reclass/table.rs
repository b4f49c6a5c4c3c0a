//! Table-driven reclassification
//!
//! Rules use the `r.reclass` text form:
//!
//! ```text
//! # forest classes
//! 111 112 113 = 1 Forest
//! 41 thru 49  = 41 Other open land
//! 61          = NULL
//! *           = 99 Unclassified
//! ```
//!
//! The first rule whose inputs contain a cell value decides its class. Cells
//! matched by no rule take the `*` default if there is one, else no-data.

use crate::maybe_rayon::*;
use rengis_core::raster::{CategoryTable, Raster};
use rengis_core::{Error, Result};

/// Input values a rule applies to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReclassInput {
    /// Exact value
    Value(f64),
    /// Inclusive range
    Range(f64, f64),
}

impl ReclassInput {
    fn matches(self, v: f64) -> bool {
        match self {
            ReclassInput::Value(x) => v == x,
            ReclassInput::Range(lo, hi) => v >= lo && v <= hi,
        }
    }
}

/// One reclassification rule: inputs mapped to a class code, or to no-data
/// when `output` is `None`
#[derive(Debug, Clone, PartialEq)]
pub struct ReclassRule {
    pub inputs: Vec<ReclassInput>,
    pub output: Option<i64>,
    pub label: Option<String>,
}

/// Ordered reclassification rules with an optional `*` default
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReclassTable {
    rules: Vec<ReclassRule>,
    /// `Some(None)` maps unmatched cells to no-data explicitly
    default: Option<Option<i64>>,
    default_label: Option<String>,
}

fn parse_value(token: &str, line: usize) -> Result<f64> {
    token.parse::<f64>().map_err(|_| Error::InvalidRule {
        line,
        reason: format!("'{}' is not a number", token),
    })
}

impl ReclassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rule text. Parsing stops at a line reading `end`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("end") {
                break;
            }

            let (lhs, rhs) = line.split_once('=').ok_or_else(|| Error::InvalidRule {
                line: line_no,
                reason: "expected 'inputs = output [label]'".into(),
            })?;

            let mut rhs_tokens = rhs.trim().splitn(2, char::is_whitespace);
            let output = match rhs_tokens.next().filter(|t| !t.is_empty()) {
                None => {
                    return Err(Error::InvalidRule {
                        line: line_no,
                        reason: "missing output value".into(),
                    });
                }
                Some(t) if t.eq_ignore_ascii_case("null") => None,
                Some(t) => Some(t.parse::<i64>().map_err(|_| Error::InvalidRule {
                    line: line_no,
                    reason: format!("output '{}' is not an integer class", t),
                })?),
            };
            let label = rhs_tokens
                .next()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from);

            let tokens: Vec<&str> = lhs.split_whitespace().collect();
            if tokens == ["*"] {
                table.default = Some(output);
                table.default_label = label;
                continue;
            }

            let mut inputs = Vec::new();
            let mut i = 0;
            while i < tokens.len() {
                let lo = parse_value(tokens[i], line_no)?;
                if tokens.get(i + 1).is_some_and(|t| t.eq_ignore_ascii_case("thru")) {
                    let hi_token = tokens.get(i + 2).ok_or_else(|| Error::InvalidRule {
                        line: line_no,
                        reason: "'thru' without an upper bound".into(),
                    })?;
                    let hi = parse_value(hi_token, line_no)?;
                    inputs.push(ReclassInput::Range(lo.min(hi), lo.max(hi)));
                    i += 3;
                } else {
                    inputs.push(ReclassInput::Value(lo));
                    i += 1;
                }
            }
            if inputs.is_empty() {
                return Err(Error::InvalidRule {
                    line: line_no,
                    reason: "no input values".into(),
                });
            }

            table.rules.push(ReclassRule {
                inputs,
                output,
                label,
            });
        }

        if table.rules.is_empty() && table.default.is_none() {
            return Err(Error::InvalidRule {
                line: 0,
                reason: "no rules".into(),
            });
        }
        Ok(table)
    }

    /// Append a rule
    pub fn push(&mut self, rule: ReclassRule) {
        self.rules.push(rule);
    }

    /// Set the class for values matched by no rule
    pub fn set_default(&mut self, output: Option<i64>) {
        self.default = Some(output);
    }

    pub fn rules(&self) -> &[ReclassRule] {
        &self.rules
    }

    /// Class for one input value; `None` means no-data
    pub fn classify(&self, v: f64) -> Option<i64> {
        if v.is_nan() {
            return None;
        }
        self.rules
            .iter()
            .find(|r| r.inputs.iter().any(|i| i.matches(v)))
            .map(|r| r.output)
            .unwrap_or_else(|| self.default.flatten())
    }

    /// Labels of output classes. The first label given for a class is kept.
    pub fn categories(&self) -> CategoryTable {
        let mut table = CategoryTable::new();
        let labelled = self
            .rules
            .iter()
            .map(|r| (r.output, r.label.as_deref()))
            .chain(std::iter::once((
                self.default.flatten(),
                self.default_label.as_deref(),
            )));
        for (output, label) in labelled {
            if let (Some(code), Some(label)) = (output, label)
                && table.get(code).is_none()
            {
                table.insert(code, label, None);
            }
        }
        table
    }
}

/// Reclassify raster values through `table`.
pub fn reclassify(raster: &Raster<f64>, table: &ReclassTable) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let v = unsafe { raster.value_unchecked(row, col) };
                    table.classify(v).map_or(f64::NAN, |c| c as f64)
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    raster.derive(data, Some(f64::NAN))
}
