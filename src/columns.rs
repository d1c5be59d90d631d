use smallvec::SmallVec;

use crate::error::TreeError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default lower bound for a computed column width.
pub const MIN_COLUMN_WIDTH: f64 = 4.0;

/// Parsed width request of a column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColumnWidth {
    /// Absolute width in pixels (`"50px"`).
    Fixed(f64),
    /// Share of the remaining width (`"2"`, `"0.5"`; `"*"` or empty means 1).
    Weight(f64),
}

impl Default for ColumnWidth {
    fn default() -> Self {
        Self::Weight(1.0)
    }
}

impl ColumnWidth {
    /// Parses a width string; returns `None` if it is neither `"<n>px"` nor a weight.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Some(Self::default());
        }
        if let Some(px) = text.strip_suffix("px") {
            let px: f64 = px.trim().parse().ok()?;
            return (px.is_finite() && px >= 0.0).then_some(Self::Fixed(px));
        }
        let weight: f64 = text.parse().ok()?;
        (weight.is_finite() && weight >= 0.0).then_some(Self::Weight(weight))
    }
}

/// Column definition: id, header title and width request.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column id; cell text is looked up by this id (`"*"` is the tree column).
    pub id: String,
    /// Header label.
    pub title: String,
    /// Width request, e.g. `"50px"`, `"2"` or `"*"`.
    pub width: String,
}

impl ColumnDef {
    /// Creates a column with weight 1.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            width: "*".to_string(),
        }
    }

    /// Sets the raw width request.
    #[must_use]
    pub fn width(mut self, width: impl Into<String>) -> Self {
        self.width = width.into();
        self
    }

    /// Sets an absolute width in pixels.
    #[must_use]
    pub fn fixed(self, px: u32) -> Self {
        self.width(format!("{px}px"))
    }

    /// Sets a relative weight.
    #[must_use]
    pub fn weight(self, weight: f64) -> Self {
        self.width(weight.to_string())
    }
}

/// A column with its computed geometry.
#[derive(Clone, Debug)]
pub struct Column {
    def: ColumnDef,
    ofs_px: f64,
    width_px: f64,
    invalid_reported: bool,
}

impl From<ColumnDef> for Column {
    fn from(def: ColumnDef) -> Self {
        Self::new(def)
    }
}

impl Column {
    pub const fn new(def: ColumnDef) -> Self {
        Self {
            def,
            ofs_px: 0.0,
            width_px: 0.0,
            invalid_reported: false,
        }
    }

    pub const fn def(&self) -> &ColumnDef {
        &self.def
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    /// Absolute offset from the left edge (valid after a layout).
    pub const fn offset(&self) -> f64 {
        self.ofs_px
    }

    /// Absolute width (valid after a layout).
    pub const fn width(&self) -> f64 {
        self.width_px
    }

    /// Returns the column's `(x, width)` in whole units, relative to the row start.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "widths are clamped to u16")]
    pub fn cell_bounds(&self) -> (u16, u16) {
        let start = self.ofs_px.round().clamp(0.0, f64::from(u16::MAX));
        let end = (self.ofs_px + self.width_px)
            .round()
            .clamp(start, f64::from(u16::MAX));
        (start as u16, (end - start) as u16)
    }

    fn set_geometry(&mut self, ofs_px: f64, width_px: f64) -> bool {
        let modified = self.ofs_px != ofs_px || self.width_px != width_px;
        self.ofs_px = ofs_px;
        self.width_px = width_px;
        modified
    }
}

/// Result of [`layout_columns`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    /// `true` if any column's offset or width changed.
    pub modified: bool,
    /// Indices of columns whose width could not be parsed (reported once per column).
    pub invalid: SmallVec<[usize; 4]>,
}

/// Distributes `total_width` across `columns`.
///
/// Fixed columns get exactly their width (at least `min_width`); the rest is split
/// among weighted columns in proportion to their weight (each at least `min_width`).
/// Unparseable widths fall back to weight 1.
pub fn layout_columns(total_width: f64, columns: &mut [Column], min_width: f64) -> ColumnLayout {
    let mut layout = ColumnLayout::default();
    let mut requests = SmallVec::<[ColumnWidth; 8]>::with_capacity(columns.len());
    let mut total_weight = 0.0;
    let mut fixed_width = 0.0;

    for (idx, column) in columns.iter_mut().enumerate() {
        let request = ColumnWidth::parse(&column.def.width).unwrap_or_else(|| {
            if !column.invalid_reported {
                column.invalid_reported = true;
                let err = TreeError::invalid_width(column.def.id.as_str(), column.def.width.as_str());
                log::warn!("{err}, using weight 1");
                layout.invalid.push(idx);
            }
            ColumnWidth::default()
        });
        match request {
            ColumnWidth::Fixed(px) => fixed_width += px.max(min_width),
            ColumnWidth::Weight(weight) => total_weight += weight,
        }
        requests.push(request);
    }

    // Share remaining space between weighted columns.
    let rest = (total_width - fixed_width).max(0.0);
    let mut ofs = 0.0;
    for (column, request) in columns.iter_mut().zip(requests) {
        let width = match request {
            ColumnWidth::Fixed(px) => px.max(min_width),
            ColumnWidth::Weight(weight) if total_weight > 0.0 => {
                (rest * weight / total_weight).max(min_width)
            }
            ColumnWidth::Weight(_) => min_width,
        };
        layout.modified |= column.set_geometry(ofs, width);
        ofs += width;
    }
    layout
}
