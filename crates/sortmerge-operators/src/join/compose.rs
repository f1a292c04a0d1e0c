//! Filter and projection of matched pairs.

use sortmerge_core::expr::{FieldRef, OutputFilter};
use sortmerge_core::order::Side;
use sortmerge_core::prelude::Schema;
use sortmerge_core::schema::Field;
use sortmerge_core::types::Tuple;

use crate::filter::{bind_literals, eval_filter};
use crate::traits::OpError;

/// Turns a matched (left, right) pair into an output tuple, or rejects it.
#[derive(Debug, Clone)]
pub struct OutputComposer {
    filter: OutputFilter,
    projection: Vec<FieldRef>,
    left_fields: usize,
    right_fields: usize,
    schema: Schema,
}

impl OutputComposer {
    /// Validate the filter and projection against both input schemas and
    /// derive the output schema.
    ///
    /// `left_output_fields` must equal the number of left-side entries in
    /// `projection`. Right-side output names that collide with a projected
    /// left name get a `_right` suffix.
    pub fn new(
        filter: &OutputFilter,
        projection: &[FieldRef],
        left_output_fields: usize,
        left: &Schema,
        right: &Schema,
    ) -> Result<Self, OpError> {
        if projection.is_empty() {
            return Err(OpError::InvalidJoinConfiguration("projection is empty".into()));
        }
        let filter = bind_literals(filter, left, right)?;

        let mut fields: Vec<Field> = Vec::with_capacity(projection.len());
        for r in projection {
            let schema = match r.side {
                Side::Left => left,
                Side::Right => right,
            };
            let field = schema.field(r.column).ok_or(OpError::ProjectionIndexOutOfRange {
                side: r.side,
                index: r.column,
                field_count: schema.len(),
            })?;
            fields.push(field.clone());
        }

        let from_left = projection.iter().filter(|r| r.side == Side::Left).count();
        if from_left != left_output_fields {
            return Err(OpError::InvalidJoinConfiguration(format!(
                "left output field count is {left_output_fields} but the projection takes {from_left} left fields"
            )));
        }

        let left_names: Vec<String> = projection
            .iter()
            .zip(&fields)
            .filter(|(r, _)| r.side == Side::Left)
            .map(|(_, f)| f.name.clone())
            .collect();
        for (r, f) in projection.iter().zip(fields.iter_mut()) {
            if r.side == Side::Right && left_names.contains(&f.name) {
                f.name = format!("{}_right", f.name);
            }
        }

        Ok(Self {
            filter,
            projection: projection.to_vec(),
            left_fields: left.len(),
            right_fields: right.len(),
            schema: Schema::new(fields),
        })
    }

    /// Projection taking every left field, then every right field.
    pub fn all_fields(left: &Schema, right: &Schema) -> Vec<FieldRef> {
        (1..=left.len())
            .map(FieldRef::left)
            .chain((1..=right.len()).map(FieldRef::right))
            .collect()
    }

    pub fn output_schema(&self) -> &Schema {
        &self.schema
    }

    /// The filter with literals converted to their fields' types.
    pub fn filter(&self) -> &OutputFilter {
        &self.filter
    }

    pub fn projection(&self) -> &[FieldRef] {
        &self.projection
    }

    /// `Ok(None)` when the filter rejects the pair; that is not an error.
    pub fn compose(&self, left: &Tuple, right: &Tuple) -> Result<Option<Tuple>, OpError> {
        if !eval_filter(&self.filter, left, right)? {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(self.projection.len());
        for r in &self.projection {
            let (tuple, declared) = match r.side {
                Side::Left => (left, self.left_fields),
                Side::Right => (right, self.right_fields),
            };
            let v = tuple.get(r.column).ok_or(OpError::ProjectionIndexOutOfRange {
                side: r.side,
                index: r.column,
                field_count: tuple.len().min(declared),
            })?;
            values.push(v.clone());
        }
        Ok(Some(Tuple::new(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_filter;
    use sortmerge_core::schema::DataType;
    use sortmerge_core::tuple;

    fn schemas() -> (Schema, Schema) {
        (
            Schema::new(vec![Field::new("id", DataType::Int32), Field::string("name", 4)]),
            Schema::new(vec![Field::new("id", DataType::Int32), Field::string("tag", 4)]),
        )
    }

    #[test]
    fn projects_all_fields_and_renames_collisions() {
        let (l, r) = schemas();
        let proj = OutputComposer::all_fields(&l, &r);
        let c = OutputComposer::new(&OutputFilter::always_true(), &proj, 2, &l, &r).unwrap();
        let names: Vec<&str> = c.output_schema().fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "id_right", "tag"]);
        let out = c.compose(&tuple![1i32, "a"], &tuple![1i32, "x"]).unwrap();
        assert_eq!(out, Some(tuple![1i32, "a", 1i32, "x"]));
    }

    #[test]
    fn reorders_and_filters() {
        let (l, r) = schemas();
        let filter = parse_filter(&[r#"L.2 != "b""#]).unwrap();
        let proj = [FieldRef::right(2), FieldRef::left(2)];
        let c = OutputComposer::new(&filter, &proj, 1, &l, &r).unwrap();
        assert_eq!(c.compose(&tuple![1i32, "a"], &tuple![1i32, "x"]).unwrap(), Some(tuple!["x", "a"]));
        assert_eq!(c.compose(&tuple![1i32, "b"], &tuple![1i32, "x"]).unwrap(), None);
    }

    #[test]
    fn rejects_out_of_range_projection_and_bad_left_count() {
        let (l, r) = schemas();
        let err = OutputComposer::new(&OutputFilter::always_true(), &[FieldRef::right(3)], 0, &l, &r).unwrap_err();
        assert!(matches!(
            err,
            OpError::ProjectionIndexOutOfRange { side: Side::Right, index: 3, field_count: 2 }
        ));
        let err = OutputComposer::new(&OutputFilter::always_true(), &[FieldRef::left(1)], 2, &l, &r).unwrap_err();
        assert!(matches!(err, OpError::InvalidJoinConfiguration(_)));
        assert!(OutputComposer::new(&OutputFilter::always_true(), &[], 0, &l, &r).is_err());
    }

    #[test]
    fn short_runtime_tuple_is_reported() {
        let (l, r) = schemas();
        let c = OutputComposer::new(&OutputFilter::always_true(), &[FieldRef::left(2)], 1, &l, &r).unwrap();
        assert!(matches!(
            c.compose(&tuple![1i32], &tuple![1i32, "x"]),
            Err(OpError::ProjectionIndexOutOfRange { side: Side::Left, index: 2, field_count: 1 })
        ));
    }
}
