//! ### Resample
//! Averages raw flukso exports into fixed-width buckets, producing the
//! chunk files the series store reads.

use crate::{
    convert::{self, FluksoCsvRow},
    error::Result,
    score::Cadence,
};
use chrono::DateTime;
use std::{collections::BTreeMap, path::Path};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    consumption: f64,
    production: f64,
    production_ct: usize,
    total: f64,
    total_ct: usize,
    count: usize,
}

pub struct Resampler {
    cadence: Cadence,
}

impl Resampler {
    pub fn new(cadence: Cadence) -> Self {
        Self { cadence }
    }

    /// Index of the UTC bucket `epoch_secs` falls in.
    fn bucket_of(&self, epoch_secs: i64) -> i64 {
        epoch_secs.div_euclid(self.cadence.duration().num_seconds())
    }

    /// Reads every input, averages each column per bucket and writes the
    /// buckets in time order. Buckets without a usable reading are left out,
    /// and non-positive consumption readings are dropped rather than
    /// averaged into a plausible-looking value. Returns the number of rows
    /// written.
    pub fn resample(&self, inputs: &[impl AsRef<Path>], output: &Path) -> Result<usize> {
        let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
        let mut defective = 0;

        for input in inputs {
            let mut reader = csv::Reader::from_path(input)?;
            for line in reader.deserialize() {
                let line: FluksoCsvRow = line?;
                if !(line.consumption > 0.) {
                    defective += 1;
                    continue;
                }
                let timestamp = convert::parse_utc(&line.timestamp)?;
                let bucket = buckets.entry(self.bucket_of(timestamp.timestamp())).or_default();
                bucket.consumption += line.consumption;
                bucket.count += 1;
                if let Some(production) = line.production {
                    bucket.production += production;
                    bucket.production_ct += 1;
                }
                if let Some(total) = line.total {
                    bucket.total += total;
                    bucket.total_ct += 1;
                }
            }
        }
        if defective > 0 {
            warn!(defective, "dropped non-positive consumption readings");
        }

        let width = self.cadence.duration().num_seconds();
        let mut out_csv = csv::Writer::from_path(output)?;
        for (idx, bucket) in &buckets {
            let Some(start) = DateTime::from_timestamp(idx * width, 0) else {
                continue;
            };
            out_csv.serialize(&FluksoCsvRow {
                timestamp: convert::format_utc(&start),
                consumption: bucket.consumption / bucket.count as f64,
                production: (bucket.production_ct > 0)
                    .then(|| bucket.production / bucket.production_ct as f64),
                total: (bucket.total_ct > 0).then(|| bucket.total / bucket.total_ct as f64),
            })?;
        }
        out_csv.flush()?;

        info!(
            inputs = inputs.len(),
            rows = buckets.len(),
            minutes = self.cadence.minutes(),
            "resampled"
        );
        Ok(buckets.len())
    }
}
