//! Construction-time join options.

use serde::{Deserialize, Serialize};

use sortmerge_core::config::{EngineConfig, DEFAULT_PAGE_SIZE};
use sortmerge_core::expr::{FieldRef, OutputFilter};
use sortmerge_core::order::{Side, SortOrder};
use sortmerge_core::prelude::Schema;
use sortmerge_core::schema::DataType;

use crate::traits::OpError;

use super::compose::OutputComposer;

/// Join column of one side: 1-based position and key byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub column: usize,
    pub length: usize,
}

impl KeySpec {
    pub fn new(column: usize, length: usize) -> Self {
        Self { column, length }
    }

    /// Key on `column` with the length its field declares (0 if it declares
    /// none, which validation rejects).
    pub fn for_column(schema: &Schema, column: usize) -> Self {
        let length = schema.field(column).and_then(|f| f.key_width()).unwrap_or(0);
        Self { column, length }
    }
}

fn default_mem_pages() -> usize {
    EngineConfig::default().default_mem_pages
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Everything a `SortMergeJoin` is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOptions {
    pub left_schema: Schema,
    pub right_schema: Schema,
    pub left_key: KeySpec,
    pub right_key: KeySpec,
    /// Memory budget in pages, for each sort and for the buffered group.
    #[serde(default = "default_mem_pages")]
    pub mem_pages: usize,
    #[serde(default = "default_page_size")]
    pub page_size_bytes: usize,
    #[serde(default)]
    pub left_sorted: bool,
    #[serde(default)]
    pub right_sorted: bool,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub filter: OutputFilter,
    pub projection: Vec<FieldRef>,
    pub left_output_fields: usize,
}

impl JoinOptions {
    /// Join `left_schema` column `left_column` with `right_schema` column
    /// `right_column` (both 1-based). Defaults: ascending, neither side
    /// sorted, no filter, every field of both sides projected, and the
    /// default engine memory settings.
    pub fn new(left_schema: Schema, left_column: usize, right_schema: Schema, right_column: usize) -> Self {
        let left_key = KeySpec::for_column(&left_schema, left_column);
        let right_key = KeySpec::for_column(&right_schema, right_column);
        let projection = OutputComposer::all_fields(&left_schema, &right_schema);
        let left_output_fields = left_schema.len();
        Self {
            left_schema,
            right_schema,
            left_key,
            right_key,
            mem_pages: default_mem_pages(),
            page_size_bytes: default_page_size(),
            left_sorted: false,
            right_sorted: false,
            order: SortOrder::Ascending,
            filter: OutputFilter::always_true(),
            projection,
            left_output_fields,
        }
    }

    pub fn with_mem_pages(mut self, pages: usize) -> Self {
        self.mem_pages = pages;
        self
    }

    pub fn with_page_size(mut self, bytes: usize) -> Self {
        self.page_size_bytes = bytes;
        self
    }

    /// Memory settings from an engine configuration.
    pub fn with_engine_config(mut self, cfg: &EngineConfig) -> Self {
        self.mem_pages = cfg.default_mem_pages;
        self.page_size_bytes = cfg.page_size_bytes;
        self
    }

    /// Declare which inputs already arrive ordered on their key.
    pub fn presorted(mut self, left: bool, right: bool) -> Self {
        self.left_sorted = left;
        self.right_sorted = right;
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_filter(mut self, filter: OutputFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the projection; the left output field count follows it.
    pub fn with_projection(mut self, projection: Vec<FieldRef>) -> Self {
        self.left_output_fields = projection.iter().filter(|r| r.side == Side::Left).count();
        self.projection = projection;
        self
    }

    pub fn with_left_output_fields(mut self, n: usize) -> Self {
        self.left_output_fields = n;
        self
    }

    pub fn with_keys(mut self, left: KeySpec, right: KeySpec) -> Self {
        self.left_key = left;
        self.right_key = right;
        self
    }

    /// Memory budget in bytes.
    pub fn budget_bytes(&self) -> usize {
        self.mem_pages.saturating_mul(self.page_size_bytes)
    }

    pub fn key(&self, side: Side) -> KeySpec {
        match side {
            Side::Left => self.left_key,
            Side::Right => self.right_key,
        }
    }

    pub fn schema(&self, side: Side) -> &Schema {
        match side {
            Side::Left => &self.left_schema,
            Side::Right => &self.right_schema,
        }
    }

    pub fn is_sorted(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left_sorted,
            Side::Right => self.right_sorted,
        }
    }

    /// Type of the join key (both sides agree once validated).
    pub fn key_type(&self) -> Option<DataType> {
        self.left_schema.field(self.left_key.column).map(|f| f.data_type)
    }

    /// Check every option without touching any input. Returns the composer
    /// the options describe.
    pub fn validate(&self) -> Result<OutputComposer, OpError> {
        if self.mem_pages == 0 {
            return Err(invalid("memory budget must be at least one page".into()));
        }
        if self.page_size_bytes == 0 {
            return Err(invalid("page size must be positive".into()));
        }
        let lt = check_key(Side::Left, &self.left_schema, self.left_key)?;
        let rt = check_key(Side::Right, &self.right_schema, self.right_key)?;
        if lt != rt {
            return Err(invalid(format!("left key is {lt:?} but right key is {rt:?}")));
        }
        if self.left_key.length != self.right_key.length && lt.fixed_width().is_some() {
            return Err(invalid("left and right key lengths differ".into()));
        }
        OutputComposer::new(
            &self.filter,
            &self.projection,
            self.left_output_fields,
            &self.left_schema,
            &self.right_schema,
        )
    }
}

fn check_key(side: Side, schema: &Schema, key: KeySpec) -> Result<DataType, OpError> {
    let field = schema.field(key.column).ok_or_else(|| {
        invalid(format!(
            "{side} join column {} is outside 1..={}",
            key.column,
            schema.len()
        ))
    })?;
    let t = field.data_type;
    if !t.is_orderable() {
        return Err(invalid(format!(
            "{side} join column '{}' has type {t:?}, which has no order",
            field.name
        )));
    }
    let ok = match (t.fixed_width(), field.max_len) {
        (Some(w), _) => key.length == w,
        (None, Some(max)) => (1..=max).contains(&key.length),
        (None, None) => key.length > 0,
    };
    if !ok {
        return Err(invalid(format!(
            "{side} key length {} does not fit field '{}' ({t:?}, width {:?})",
            key.length,
            field.name,
            field.key_width()
        )));
    }
    Ok(t)
}

fn invalid(msg: String) -> OpError {
    OpError::InvalidJoinConfiguration(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortmerge_core::schema::Field;

    fn left() -> Schema {
        Schema::new(vec![Field::new("id", DataType::Int32), Field::string("name", 8)])
    }

    fn right() -> Schema {
        Schema::new(vec![Field::new("id", DataType::Int32), Field::new("flag", DataType::Boolean)])
    }

    #[test]
    fn defaults_validate() {
        let opts = JoinOptions::new(left(), 1, right(), 1);
        assert_eq!(opts.left_key, KeySpec::new(1, 4));
        assert_eq!(opts.left_output_fields, 2);
        assert_eq!(opts.budget_bytes(), 64 * 1024);
        let composer = opts.validate().unwrap();
        assert_eq!(composer.output_schema().len(), 4);
    }

    #[test]
    fn rejects_bad_keys() {
        let cases = [
            JoinOptions::new(left(), 0, right(), 1),
            JoinOptions::new(left(), 3, right(), 1),
            JoinOptions::new(left(), 1, right(), 2),
            JoinOptions::new(left(), 2, right(), 1),
            JoinOptions::new(left(), 1, right(), 1).with_keys(KeySpec::new(1, 8), KeySpec::new(1, 4)),
            JoinOptions::new(left(), 2, left(), 2).with_keys(KeySpec::new(2, 9), KeySpec::new(2, 8)),
            JoinOptions::new(left(), 1, right(), 1).with_mem_pages(0),
            JoinOptions::new(left(), 1, right(), 1).with_page_size(0),
        ];
        for opts in cases {
            assert!(
                matches!(opts.validate(), Err(OpError::InvalidJoinConfiguration(_))),
                "{opts:?} should be rejected"
            );
        }
    }

    #[test]
    fn string_keys_accept_lengths_up_to_max() {
        let opts = JoinOptions::new(left(), 2, left(), 2).with_keys(KeySpec::new(2, 3), KeySpec::new(2, 8));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn projection_problems_surface() {
        let opts = JoinOptions::new(left(), 1, right(), 1).with_projection(vec![FieldRef::left(5)]);
        assert!(matches!(opts.validate(), Err(OpError::ProjectionIndexOutOfRange { .. })));
        let opts = JoinOptions::new(left(), 1, right(), 1)
            .with_projection(vec![FieldRef::left(1)])
            .with_left_output_fields(2);
        assert!(matches!(opts.validate(), Err(OpError::InvalidJoinConfiguration(_))));
    }

    #[test]
    fn options_round_trip_through_json_with_defaults() {
        let json = r#"{
            "left_schema": {"fields": [{"name": "id", "data_type": "Int32"}]},
            "right_schema": {"fields": [{"name": "id", "data_type": "Int32"}]},
            "left_key": {"column": 1, "length": 4},
            "right_key": {"column": 1, "length": 4},
            "projection": [{"side": "left", "column": 1}],
            "left_output_fields": 1
        }"#;
        let opts: JoinOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.mem_pages, 64);
        assert_eq!(opts.page_size_bytes, 1024);
        assert_eq!(opts.order, SortOrder::Ascending);
        assert!(opts.validate().is_ok());
    }
}
