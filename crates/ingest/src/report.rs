use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use tracing::debug;
use warehouse_core::JobErrorRecord;

use crate::shredder::Shredder;
use crate::types::Result;

impl Shredder<'_> {
    pub fn has_job_errors(&self) -> bool {
        !self.job_errors.is_empty()
    }

    pub fn job_errors(&self) -> &[JobErrorRecord] {
        &self.job_errors
    }

    /// Writes the job data errors collected so far, replacing `path`.
    pub fn write_job_errors(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "Writing job errors");
        let mut out = BufWriter::new(File::create(path)?);
        self.render_job_errors(&mut out)?;
        out.flush()?;
        Ok(())
    }

    pub fn render_job_errors(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "{}", "=".repeat(72))?;
        writeln!(
            out,
            "Shredder end time: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(out, "Resource: {}", self.resource().unwrap_or_default())?;
        writeln!(out, "Format: {}", self.format())?;
        if let Some(fields) = self.format().input_field_names() {
            writeln!(out, "Input format: {}", fields.join("|"))?;
        }
        writeln!(out)?;

        for err in &self.job_errors {
            writeln!(out, "{}", "-".repeat(72))?;
            writeln!(out, "Input:\n{}\n", err.input)?;
            for message in &err.messages {
                writeln!(out, "{}", message)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
