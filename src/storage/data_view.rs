//! Sparse key × path tables handed to [`super::StorageEngine::insert`].
//!
//! Presence is encoded by one bitmap per row ([`RowDataView`]) or per column
//! ([`ColumnDataView`]); only cells whose bit is set carry a value. Both
//! constructors validate the shape, so a view that exists is well formed.

use bitvec::vec::BitVec;
use rustc_hash::FxHashSet;

use crate::types::{DataType, PolyError, Result, Tags, Value, MAX_KEY};

/// Description of one column (series) of a data view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesMeta {
    /// Logical path (`a.b.c`).
    pub path: String,
    /// Declared type of every value in the column.
    pub data_type: DataType,
    /// Tags attached to the series.
    pub tags: Tags,
}

impl SeriesMeta {
    /// Untagged series.
    pub fn new(path: impl Into<String>, data_type: DataType) -> Self {
        Self {
            path: path.into(),
            data_type,
            tags: Tags::new(),
        }
    }

    /// Replaces the tag set.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Layout {
    columns: Vec<SeriesMeta>,
    keys: Vec<i64>,
    bitmaps: Vec<BitVec>,
    values: Vec<Vec<Value>>,
}

impl Layout {
    /// `axis` is the number of bitmaps expected, `width` the length of each.
    /// `type_of(bitmap, bit)` yields the declared type of a present cell.
    fn validate(
        self,
        axis: usize,
        width: usize,
        type_of: impl Fn(usize, usize) -> DataType,
    ) -> Result<Self> {
        if let Some(pair) = self.keys.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(PolyError::InvalidDataView(format!(
                "keys must be strictly ascending, found {} before {}",
                pair[0], pair[1]
            )));
        }
        if let Some(&key) = self.keys.last().filter(|&&key| key > MAX_KEY) {
            return Err(PolyError::InvalidDataView(format!(
                "key {key} exceeds the largest storable key {MAX_KEY}"
            )));
        }
        let mut seen = FxHashSet::default();
        if let Some(dup) = self.columns.iter().find(|c| !seen.insert(c.path.as_str())) {
            return Err(PolyError::InvalidDataView(format!(
                "duplicate path '{}'",
                dup.path
            )));
        }
        if self.bitmaps.len() != axis || self.values.len() != axis {
            return Err(PolyError::InvalidDataView(format!(
                "expected {axis} bitmaps and value lists, got {} and {}",
                self.bitmaps.len(),
                self.values.len()
            )));
        }
        for (i, (bitmap, values)) in self.bitmaps.iter().zip(&self.values).enumerate() {
            if bitmap.len() != width {
                return Err(PolyError::InvalidDataView(format!(
                    "bitmap {i} has length {}, expected {width}",
                    bitmap.len()
                )));
            }
            if bitmap.count_ones() != values.len() {
                return Err(PolyError::InvalidDataView(format!(
                    "bitmap {i} has {} set bits but {} values",
                    bitmap.count_ones(),
                    values.len()
                )));
            }
            for (bit, value) in bitmap.iter_ones().zip(values) {
                let expected = type_of(i, bit);
                if value.data_type() != expected {
                    return Err(PolyError::InvalidDataView(format!(
                        "value {value} at ({i}, {bit}) is not {expected}"
                    )));
                }
            }
        }
        Ok(self)
    }
}

/// Row-oriented view: `bitmaps[r]` spans the paths, `values[r]` holds the
/// present cells of row `r` in path order.
#[derive(Clone, Debug, PartialEq)]
pub struct RowDataView {
    layout: Layout,
}

impl RowDataView {
    /// Validates and builds a row-oriented view.
    pub fn new(
        columns: Vec<SeriesMeta>,
        keys: Vec<i64>,
        bitmaps: Vec<BitVec>,
        values: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let (rows, width) = (keys.len(), columns.len());
        let types: Vec<DataType> = columns.iter().map(|c| c.data_type).collect();
        let layout = Layout {
            columns,
            keys,
            bitmaps,
            values,
        }
        .validate(rows, width, |_, col| types[col])?;
        Ok(Self { layout })
    }

    /// Builds a view from dense rows where `None` marks an absent cell.
    pub fn from_rows(columns: Vec<SeriesMeta>, rows: Vec<(i64, Vec<Option<Value>>)>) -> Result<Self> {
        let width = columns.len();
        let mut keys = Vec::with_capacity(rows.len());
        let mut bitmaps = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for (key, cells) in rows {
            if cells.len() != width {
                return Err(PolyError::InvalidDataView(format!(
                    "row {key} has {} cells, expected {width}",
                    cells.len()
                )));
            }
            let (bitmap, present) = split_cells(cells);
            keys.push(key);
            bitmaps.push(bitmap);
            values.push(present);
        }
        Self::new(columns, keys, bitmaps, values)
    }

    /// Series described by the view.
    pub fn columns(&self) -> &[SeriesMeta] {
        &self.layout.columns
    }

    /// Ascending row keys.
    pub fn keys(&self) -> &[i64] {
        &self.layout.keys
    }

    /// Presence mask of row `row` over the paths.
    pub fn bitmap(&self, row: usize) -> &BitVec {
        &self.layout.bitmaps[row]
    }

    /// Present values of row `row`, in path order.
    pub fn values(&self, row: usize) -> &[Value] {
        &self.layout.values[row]
    }
}

/// Column-oriented view: `bitmaps[c]` spans the keys, `values[c]` holds the
/// present cells of path `c` in key order.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDataView {
    layout: Layout,
}

impl ColumnDataView {
    /// Validates and builds a column-oriented view.
    pub fn new(
        columns: Vec<SeriesMeta>,
        keys: Vec<i64>,
        bitmaps: Vec<BitVec>,
        values: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let (width, rows) = (columns.len(), keys.len());
        let types: Vec<DataType> = columns.iter().map(|c| c.data_type).collect();
        let layout = Layout {
            columns,
            keys,
            bitmaps,
            values,
        }
        .validate(width, rows, |col, _| types[col])?;
        Ok(Self { layout })
    }

    /// Builds a view from dense columns (`cells[c][k]`) where `None` marks an
    /// absent cell.
    pub fn from_columns(
        columns: Vec<SeriesMeta>,
        keys: Vec<i64>,
        cells: Vec<Vec<Option<Value>>>,
    ) -> Result<Self> {
        let mut bitmaps = Vec::with_capacity(cells.len());
        let mut values = Vec::with_capacity(cells.len());
        for (c, column) in cells.into_iter().enumerate() {
            if column.len() != keys.len() {
                return Err(PolyError::InvalidDataView(format!(
                    "column {c} has {} cells, expected {}",
                    column.len(),
                    keys.len()
                )));
            }
            let (bitmap, present) = split_cells(column);
            bitmaps.push(bitmap);
            values.push(present);
        }
        Self::new(columns, keys, bitmaps, values)
    }

    /// Series described by the view.
    pub fn columns(&self) -> &[SeriesMeta] {
        &self.layout.columns
    }

    /// Ascending row keys.
    pub fn keys(&self) -> &[i64] {
        &self.layout.keys
    }

    /// Presence mask of column `col` over the keys.
    pub fn bitmap(&self, col: usize) -> &BitVec {
        &self.layout.bitmaps[col]
    }

    /// Present values of column `col`, in key order.
    pub fn values(&self, col: usize) -> &[Value] {
        &self.layout.values[col]
    }
}

fn split_cells(cells: Vec<Option<Value>>) -> (BitVec, Vec<Value>) {
    let bitmap: BitVec = cells.iter().map(Option::is_some).collect();
    let present = cells.into_iter().flatten().collect();
    (bitmap, present)
}

/// Either orientation of a data view.
#[derive(Clone, Debug, PartialEq)]
pub enum DataView {
    /// Row-major presence.
    Row(RowDataView),
    /// Column-major presence.
    Column(ColumnDataView),
}

impl DataView {
    /// Series described by the view.
    pub fn columns(&self) -> &[SeriesMeta] {
        match self {
            DataView::Row(view) => view.columns(),
            DataView::Column(view) => view.columns(),
        }
    }

    /// Ascending row keys.
    pub fn keys(&self) -> &[i64] {
        match self {
            DataView::Row(view) => view.keys(),
            DataView::Column(view) => view.keys(),
        }
    }
}

impl From<RowDataView> for DataView {
    fn from(view: RowDataView) -> Self {
        DataView::Row(view)
    }
}

impl From<ColumnDataView> for DataView {
    fn from(view: ColumnDataView) -> Self {
        DataView::Column(view)
    }
}
