//! Category and color tables for classified grids

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Parse `r:g:b`
    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(format!("expected r:g:b, got '{}'", s));
        }
        let channel = |p: &str| {
            p.trim()
                .parse::<u8>()
                .map_err(|e| format!("bad color channel '{}': {}", p, e))
        };
        Ok(Self::new(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.r, self.g, self.b)
    }
}

/// One entry of a category table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    #[serde(default)]
    pub color: Option<Rgb>,
}

/// Ordered mapping from integer class code to label and display color.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable {
    entries: BTreeMap<i64, Category>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `code<sep>label[<sep>r:g:b]` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped. A first line whose
    /// code does not parse is treated as a header.
    pub fn parse(text: &str, separator: char) -> Result<Self> {
        let mut table = Self::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.splitn(3, separator).map(str::trim).collect();
            let code = match fields[0].parse::<i64>() {
                Ok(code) => code,
                Err(_) if table.is_empty() && idx == 0 => continue,
                Err(e) => {
                    return Err(Error::InvalidRule {
                        line: idx + 1,
                        reason: format!("class code '{}': {}", fields[0], e),
                    });
                }
            };
            let label = fields.get(1).copied().unwrap_or_default().to_string();
            let color = match fields.get(2) {
                Some(c) if !c.is_empty() => Some(c.parse::<Rgb>().map_err(|reason| {
                    Error::InvalidRule {
                        line: idx + 1,
                        reason,
                    }
                })?),
                _ => None,
            };
            table.insert(code, label, color);
        }

        Ok(table)
    }

    pub fn insert(&mut self, code: i64, label: impl Into<String>, color: Option<Rgb>) {
        self.entries.insert(
            code,
            Category {
                label: label.into(),
                color,
            },
        );
    }

    pub fn get(&self, code: i64) -> Option<&Category> {
        self.entries.get(&code)
    }

    pub fn label(&self, code: i64) -> Option<&str> {
        self.entries.get(&code).map(|c| c.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending class code order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &Category)> {
        self.entries.iter().map(|(&k, v)| (k, v))
    }

    /// Color table holding the colors present in this table
    pub fn colors(&self) -> ColorTable {
        let mut colors = ColorTable::default();
        for (code, cat) in self.iter() {
            if let Some(c) = cat.color {
                colors.insert(code, c);
            }
        }
        colors
    }

    /// Render back to `code,label[,r:g:b]` lines, taking colors from
    /// `colors` when the entry has none of its own
    pub fn to_csv(&self, colors: Option<&ColorTable>) -> String {
        let mut out = String::from("code,label,color\n");
        for (code, cat) in self.iter() {
            let color = cat.color.or_else(|| colors.and_then(|t| t.get(code)));
            match color {
                Some(c) => out.push_str(&format!("{},{},{}\n", code, cat.label, c)),
                None => out.push_str(&format!("{},{},\n", code, cat.label)),
            }
        }
        out
    }
}

/// Ordered mapping from class code to display color
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorTable {
    entries: BTreeMap<i64, Rgb>,
}

impl ColorTable {
    pub fn insert(&mut self, code: i64, color: Rgb) {
        self.entries.insert(code, color);
    }

    pub fn get(&self, code: i64) -> Option<Rgb> {
        self.entries.get(&code).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
