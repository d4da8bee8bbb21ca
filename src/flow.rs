//! The case report pipeline.
//!
//! ```text
//! download -> filter -> enrich -> aggregate -> print
//!                                           -> prepare_for_upload -> upload
//! ```
//!
//! `download` is checkpointed per day, so every other run on the same day
//! works from the document fetched first. `print` and the upload branch
//! share the aggregate and may run in either order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blueprint::Blueprint;
use crate::engine::TaskHandle;
use crate::error::BuildError;
use crate::frame::Frame;
use crate::graph::Graph;
use crate::param::Param;
use crate::source::{DataSource, Record};
use crate::storage::{Storage, UploadPayload};

pub const DEFAULT_COUNTRY: &str = "Germany";
pub const DEFAULT_BUCKET: &str = "ludwigm-bucket";
pub const DEFAULT_SOURCE_URL: &str = "https://opendata.ecdc.europa.eu/covid19/casedistribution/json";

pub const COUNTRY_COLUMN: &str = "countriesAndTerritories";
pub const YEAR_COLUMN: &str = "year";
pub const MONTH_COLUMN: &str = "month";
pub const CASES_COLUMN: &str = "cases";
pub const DEATHS_COLUMN: &str = "deaths";
pub const PERIOD_COLUMN: &str = "year_month";

/// The `country` parameter: one country name, or a list of them.
///
/// `"Germany"` keeps rows equal to it, `["Germany", "France"]` keeps rows
/// matching any entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Countries {
    One(String),
    Many(Vec<String>),
}

impl Countries {
    pub fn names(&self) -> &[String] {
        match self {
            Countries::One(name) => std::slice::from_ref(name),
            Countries::Many(names) => names,
        }
    }
}

impl Default for Countries {
    fn default() -> Self {
        Countries::One(DEFAULT_COUNTRY.to_string())
    }
}

/// The CSV object handed to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub csv: String,
    pub filename: String,
}

/// The built pipeline, with handles to read each step's output.
pub struct Flow {
    pub graph: Graph,
    pub country: Param<Countries>,
    pub bucket: Param<String>,
    pub download: TaskHandle<Vec<Record>>,
    pub filter: TaskHandle<Frame>,
    pub enrich: TaskHandle<Frame>,
    pub aggregate: TaskHandle<Frame>,
    pub print: TaskHandle<()>,
    pub prepare_for_upload: TaskHandle<Prepared>,
    pub upload: TaskHandle<UploadPayload>,
}

/// Wires the pipeline around the given collaborators.
pub fn create_flow(source: Arc<dyn DataSource>, storage: Arc<dyn Storage>) -> Result<Flow, BuildError> {
    let mut blueprint = Blueprint::new();

    let country = blueprint.parameter("country", Countries::default())?;
    let bucket = blueprint.parameter("bucket", DEFAULT_BUCKET.to_string())?;

    let download = blueprint
        .task()
        .name("download")
        .checkpoint()
        .run(move |_, ()| {
            let records = source.download_records()?;
            info!(records = records.len(), "Downloaded case reports");
            Ok(records)
        })?;

    let filter = blueprint
        .task()
        .name("filter")
        .using((download, country))
        .run(|_, (records, countries)| {
            let frame = Frame::from_records(records);
            Ok(frame.filter_in(COUNTRY_COLUMN, countries.names())?)
        })?;

    let enrich = blueprint
        .task()
        .name("enrich")
        .using(filter)
        .run(|_, frame| {
            let period = frame.concat_columns(YEAR_COLUMN, MONTH_COLUMN, "_")?;
            Ok(frame.clone().with_column(PERIOD_COLUMN, period)?)
        })?;

    let aggregate = blueprint
        .task()
        .name("aggregate")
        .using(enrich)
        .run(|_, frame| Ok(frame.group_sum(PERIOD_COLUMN, &[CASES_COLUMN, DEATHS_COLUMN])?))?;

    let print = blueprint
        .task()
        .name("print")
        .using(aggregate)
        .run(|_, frame| {
            println!("{frame}");
            Ok(())
        })?;

    let prepare_for_upload = blueprint
        .task()
        .name("prepare_for_upload")
        .using(aggregate)
        .run(|ctx, frame| {
            let timestamp = ctx.run.now.format("%Y-%m-%dT%H:%M:%S%.6f");
            Ok(Prepared {
                csv: frame.to_csv()?,
                filename: format!("covid-monthly-{timestamp}.csv"),
            })
        })?;

    let upload = blueprint
        .task()
        .name("upload")
        .using((prepare_for_upload, bucket))
        .run(move |_, (prepared, bucket)| {
            storage.upload(&prepared.csv, &prepared.filename, bucket)?;
            Ok(UploadPayload {
                content: prepared.csv.clone(),
                object_name: prepared.filename.clone(),
                bucket: bucket.clone(),
            })
        })?;

    Ok(Flow {
        graph: blueprint.build()?,
        country,
        bucket,
        download,
        filter,
        enrich,
        aggregate,
        print,
        prepare_for_upload,
        upload,
    })
}
