//! YAML join jobs: two CSV inputs, a join description and a sink.
//!
//! ```yaml
//! left:
//!   source: "data/orders.csv"
//!   schema:
//!     - { name: "id",   type: "Int32" }
//!     - { name: "cust", type: "Utf8", max_len: 16 }
//!   key: "cust"
//! right:
//!   source: "data/customers.csv"
//!   schema:
//!     - { name: "cust", type: "Utf8", max_len: 16 }
//!     - { name: "tier", type: "Int32" }
//!   key: 1
//!   sorted: true
//! order: ascending
//! mem_pages: 32
//! filter: [ 'R.2 >= 2', 'L.1 != 0 OR R.2 == 3' ]
//! projection: [ "L.id", "R.tier" ]
//! sink: { destination: "out/joined.csv", format: "csv" }
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use sortmerge_core::config::EngineConfig;
use sortmerge_core::expr::FieldRef;
use sortmerge_core::order::{Side, SortOrder};
use sortmerge_core::schema::{DataType, Field, Schema};
use sortmerge_operators::filter::{bind_literals, parse_field_ref, parse_filter};
use sortmerge_operators::{
    ExternalSort, JoinMetrics, JoinOptions, KeySpec, SortMergeJoin, TupleStream,
};

use crate::error::{Error, Result};
use crate::readers::csv::CsvScan;
use crate::storage::spill_manager_from_config;
use crate::writers::{create_writer, SinkFormat, TupleWriter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinJob {
    #[serde(default)]
    pub name: Option<String>,
    pub left: InputDef,
    pub right: InputDef,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub mem_pages: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Conjuncts; each may join predicates with ` OR `.
    #[serde(default)]
    pub filter: Vec<String>,
    /// `L.<col>` / `R.<col>` by position or name. Empty means every field.
    #[serde(default)]
    pub projection: Vec<String>,
    #[serde(default)]
    pub sink: Option<SinkDef>,
    #[serde(default)]
    pub spill: Option<SpillDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDef {
    pub source: String,
    pub schema: Vec<FieldDef>,
    pub key: KeyColumn,
    #[serde(default)]
    pub key_length: Option<usize>,
    #[serde(default)]
    pub sorted: bool,
    #[serde(default = "default_true")]
    pub has_headers: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub max_len: Option<usize>,
}

/// Key column given as a 1-based position or a field name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyColumn {
    Position(usize),
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkDef {
    pub destination: String,
    #[serde(default)]
    pub format: SinkFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpillDef {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub rows_written: u64,
    pub columns: Vec<String>,
    pub destination: Option<String>,
    pub metrics: JoinMetrics,
}

pub fn parse_join_job(text: &str) -> Result<JoinJob> {
    Ok(serde_yaml::from_str(text)?)
}

impl FieldDef {
    fn to_field(&self) -> Result<Field> {
        let data_type = DataType::parse(&self.data_type).ok_or_else(|| {
            Error::Config(format!("field '{}': unknown type '{}'", self.name, self.data_type))
        })?;
        Ok(Field {
            name: self.name.clone(),
            data_type,
            max_len: self.max_len,
        })
    }
}

impl InputDef {
    pub fn to_schema(&self) -> Result<Schema> {
        let fields = self.schema.iter().map(FieldDef::to_field).collect::<Result<Vec<_>>>()?;
        Ok(Schema::new(fields))
    }

    fn key_column(&self, schema: &Schema, side: Side) -> Result<usize> {
        match &self.key {
            KeyColumn::Position(p) => Ok(*p),
            KeyColumn::Name(name) => schema
                .index_of(name)
                .ok_or_else(|| Error::Config(format!("{side} key '{name}' is not a field"))),
        }
    }

    fn key_spec(&self, schema: &Schema, side: Side) -> Result<KeySpec> {
        let column = self.key_column(schema, side)?;
        Ok(match self.key_length {
            Some(length) => KeySpec::new(column, length),
            None => KeySpec::for_column(schema, column),
        })
    }

    fn scan(&self, base_dir: &Path, schema: Schema) -> CsvScan {
        let path = resolve(base_dir, &self.source);
        CsvScan::from_path(path, schema).with_headers(self.has_headers)
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// `L.3`, or `L.name` looked up in the side's schema.
fn resolve_field(s: &str, left: &Schema, right: &Schema) -> Result<FieldRef> {
    let (side, schema, rest) = match s.split_once('.') {
        Some(("L", rest)) => (Side::Left, left, rest),
        Some(("R", rest)) => (Side::Right, right, rest),
        _ => return Err(Error::Config(format!("projection entry '{s}' must start with L. or R."))),
    };
    if rest.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(parse_field_ref(s)?);
    }
    let column = schema
        .index_of(rest)
        .ok_or_else(|| Error::Config(format!("{side} input has no field '{rest}'")))?;
    Ok(FieldRef { side, column })
}

impl JoinJob {
    /// `base` with this job's page size and spill overrides applied.
    pub fn engine_config(&self, base: &EngineConfig) -> EngineConfig {
        let mut cfg = base.clone();
        if let Some(p) = self.page_size {
            cfg.page_size_bytes = p;
        }
        if let Some(pages) = self.mem_pages {
            cfg.default_mem_pages = pages;
        }
        if let Some(spill) = &self.spill {
            if let Some(dir) = &spill.dir {
                cfg.spill_dir = dir.clone();
            }
            if let Some(codec) = &spill.codec {
                cfg.spill_codec = codec.clone();
            }
        }
        cfg
    }

    /// Resolve the job into validated join options.
    pub fn to_options(&self, base: &EngineConfig) -> Result<JoinOptions> {
        let cfg = self.engine_config(base);
        let left = self.left.to_schema()?;
        let right = self.right.to_schema()?;
        let left_key = self.left.key_spec(&left, Side::Left)?;
        let right_key = self.right.key_spec(&right, Side::Right)?;

        let filter = bind_literals(&parse_filter(&self.filter)?, &left, &right)?;

        let mut options = JoinOptions::new(left, left_key.column, right, right_key.column)
            .with_keys(left_key, right_key)
            .with_engine_config(&cfg)
            .presorted(self.left.sorted, self.right.sorted)
            .with_order(self.order)
            .with_filter(filter);
        if !self.projection.is_empty() {
            let projection = self
                .projection
                .iter()
                .map(|s| resolve_field(s, &options.left_schema, &options.right_schema))
                .collect::<Result<Vec<_>>>()?;
            options = options.with_projection(projection);
        }
        options.validate()?;
        Ok(options)
    }

    /// Build the join over the job's CSV inputs. Relative paths resolve
    /// against `base_dir`.
    pub fn build(&self, base_dir: &Path, base: &EngineConfig) -> Result<SortMergeJoin> {
        let cfg = self.engine_config(base);
        cfg.validate()?;
        let options = self.to_options(base)?;
        let left = self.left.scan(base_dir, options.left_schema.clone());
        let right = self.right.scan(base_dir, options.right_schema.clone());
        let sorter = ExternalSort::with_spill(Arc::new(Mutex::new(spill_manager_from_config(&cfg)?)));
        Ok(SortMergeJoin::new(options, Box::new(left), Box::new(right), Arc::new(sorter))?)
    }

    /// Run the join and write every output tuple to `writer`.
    pub fn execute(&self, base_dir: &Path, base: &EngineConfig, writer: &mut dyn TupleWriter) -> Result<JobReport> {
        let mut join = self.build(base_dir, base)?;
        let columns = join.schema().fields.iter().map(|f| f.name.clone()).collect();
        let rows = drain(&mut join, writer);
        let closed = join.close();
        let rows_written = rows?;
        closed?;
        writer.finish()?;
        Ok(JobReport {
            rows_written,
            columns,
            destination: None,
            metrics: join.metrics(),
        })
    }

    /// Run the job into its configured sink.
    pub fn run(&self, base_dir: &Path, base: &EngineConfig) -> Result<JobReport> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Error::Config("job has no sink".into()))?;
        let options = self.to_options(base)?;
        let composer = options.validate()?;
        let destination = resolve(base_dir, &sink.destination);
        let mut writer = create_writer(&destination, sink.format, composer.output_schema())?;
        let mut report = self.execute(base_dir, base, writer.as_mut())?;
        report.destination = Some(destination.display().to_string());
        Ok(report)
    }

    /// Human-readable description of the resolved join.
    pub fn explain(&self, base: &EngineConfig) -> Result<String> {
        let options = self.to_options(base)?;
        let composer = options.validate()?;
        let mut out = String::new();
        if let Some(name) = &self.name {
            let _ = writeln!(out, "job: {name}");
        }
        for (side, input) in [(Side::Left, &self.left), (Side::Right, &self.right)] {
            let key = options.key(side);
            let field = options
                .schema(side)
                .field(key.column)
                .map(|f| f.name.as_str())
                .unwrap_or("?");
            let sort = if options.is_sorted(side) { "pass-through (declared sorted)" } else { "external sort" };
            let _ = writeln!(
                out,
                "{side}: {} key column {} ({field}, {} bytes), {sort}",
                input.source, key.column, key.length
            );
        }
        let _ = writeln!(out, "order: {}", options.order);
        let _ = writeln!(
            out,
            "memory: {} pages x {} bytes = {} bytes",
            options.mem_pages,
            options.page_size_bytes,
            options.budget_bytes()
        );
        let _ = writeln!(out, "filter: {}", composer.filter());
        let columns: Vec<&str> = composer.output_schema().fields.iter().map(|f| f.name.as_str()).collect();
        let _ = writeln!(out, "output: {}", columns.join(", "));
        Ok(out)
    }
}

fn drain(join: &mut SortMergeJoin, writer: &mut dyn TupleWriter) -> Result<u64> {
    join.open()?;
    let mut rows = 0;
    while let Some(t) = join.get_next()? {
        writer.write_tuple(&t)?;
        rows += 1;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writers::jsonl::JsonlWriter;
    use sortmerge_operators::OpError;

    const JOB: &str = r#"
name: scenario
left:
  source: "left.csv"
  has_headers: false
  schema:
    - { name: "k", type: "Int32" }
    - { name: "tag", type: "Utf8", max_len: 1 }
  key: 1
right:
  source: "right.csv"
  has_headers: false
  schema:
    - { name: "k", type: "Int32" }
    - { name: "tag", type: "Utf8", max_len: 1 }
  key: "k"
mem_pages: 4
sink: { destination: "out.jsonl", format: "jsonl" }
"#;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sortmerge-job-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parses_with_defaults() {
        let job = parse_join_job(JOB).unwrap();
        assert_eq!(job.order, SortOrder::Ascending);
        assert_eq!(job.right.key, KeyColumn::Name("k".into()));
        assert!(!job.left.sorted);
        assert_eq!(job.sink.as_ref().unwrap().format, SinkFormat::Jsonl);

        let opts = job.to_options(&EngineConfig::default()).unwrap();
        assert_eq!(opts.mem_pages, 4);
        assert_eq!(opts.left_key, KeySpec::new(1, 4));
        assert_eq!(opts.right_key, KeySpec::new(1, 4));
        assert_eq!(opts.projection.len(), 4);
    }

    #[test]
    fn projection_by_name_and_filter_binding() {
        let mut job = parse_join_job(JOB).unwrap();
        job.projection = vec!["L.tag".into(), "R.2".into()];
        job.filter = vec![r#"L.2 != "b""#.into()];
        let opts = job.to_options(&EngineConfig::default()).unwrap();
        assert_eq!(opts.projection, vec![FieldRef::left(2), FieldRef::right(2)]);
        assert_eq!(opts.left_output_fields, 1);
        assert!(!opts.filter.is_empty());
    }

    #[test]
    fn bad_documents_are_config_errors() {
        let mut job = parse_join_job(JOB).unwrap();
        job.left.schema[0].data_type = "Decimal".into();
        assert!(matches!(job.to_options(&EngineConfig::default()), Err(Error::Config(_))));

        let mut job = parse_join_job(JOB).unwrap();
        job.right.key = KeyColumn::Name("missing".into());
        assert!(matches!(job.to_options(&EngineConfig::default()), Err(Error::Config(_))));

        let mut job = parse_join_job(JOB).unwrap();
        job.left.key = KeyColumn::Position(2);
        assert!(matches!(
            job.to_options(&EngineConfig::default()),
            Err(Error::Join(OpError::InvalidJoinConfiguration(_)))
        ));

        assert!(matches!(parse_join_job("left: ["), Err(Error::Yaml(_))));
    }

    #[test]
    fn runs_the_scenario_end_to_end() {
        let dir = temp_dir("run");
        std::fs::write(dir.join("left.csv"), "3,c\n1,a\n2,b\n").unwrap();
        std::fs::write(dir.join("right.csv"), "2,x\n3,z\n2,y\n").unwrap();
        let job = parse_join_job(JOB).unwrap();

        let report = job.run(&dir, &EngineConfig::default()).unwrap();
        assert_eq!(report.rows_written, 3);
        assert_eq!(report.columns, vec!["k", "tag", "k_right", "tag_right"]);
        assert_eq!(report.metrics.sorts_invoked, 2);
        let text = std::fs::read_to_string(dir.join("out.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn execute_into_a_caller_writer() {
        let dir = temp_dir("exec");
        std::fs::write(dir.join("left.csv"), "1,a\n").unwrap();
        std::fs::write(dir.join("right.csv"), "").unwrap();
        let job = parse_join_job(JOB).unwrap();
        let composer = job.to_options(&EngineConfig::default()).unwrap().validate().unwrap();
        let mut writer = JsonlWriter::new(Vec::new(), composer.output_schema());
        let report = job.execute(&dir, &EngineConfig::default(), &mut writer).unwrap();
        assert_eq!(report.rows_written, 0);
        assert_eq!(report.metrics.sorts_invoked, 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_input_file_fails_on_open() {
        let dir = temp_dir("missing");
        let job = parse_join_job(JOB).unwrap();
        let err = job.execute(&dir, &EngineConfig::default(), &mut JsonlWriter::new(Vec::new(), &Schema::default()));
        let Err(Error::Join(e)) = err else {
            panic!("expected a join error");
        };
        assert!(matches!(e.root(), OpError::StreamOpenFailed { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn explain_lists_sort_decisions_and_budget() {
        let mut job = parse_join_job(JOB).unwrap();
        job.right.sorted = true;
        let text = job.explain(&EngineConfig::default()).unwrap();
        assert!(text.contains("left: left.csv key column 1 (k, 4 bytes), external sort"));
        assert!(text.contains("right: right.csv key column 1 (k, 4 bytes), pass-through"));
        assert!(text.contains("memory: 4 pages x 1024 bytes = 4096 bytes"));
        assert!(text.contains("output: k, tag, k_right, tag_right"));
    }
}
