use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{Days, Utc};
use tracing::{debug, error, info};
use walkdir::WalkDir;
use warehouse_db::DbError;

use crate::format::Format;
use crate::shredder::Shredder;
use crate::types::{Result, ShredError};

impl Shredder<'_> {
    /// Shreds every non-hidden file in `dir`, in file-name order.
    ///
    /// Returns `None` without failing when `dir` is not a directory.
    pub fn shred_directory(&mut self, dir: &Path) -> Result<Option<usize>> {
        info!(dir = %dir.display(), "Shredding directory");
        if !dir.is_dir() {
            error!(dir = %dir.display(), "Not a directory");
            return Ok(None);
        }

        let paths = self.directory_file_paths(dir)?;
        let mut record_count = 0;
        let mut file_count = 0;
        for path in paths {
            record_count += self.shred_file(&path)?;
            file_count += 1;
        }

        info!("Shredded {} files", file_count);
        info!("Shredded {} records total", record_count);
        Ok(Some(record_count))
    }

    fn directory_file_paths(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in entries {
            let entry = entry.map_err(|err| ShredError::Io(err.into()))?;
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                debug!(file = %name, "Skipping hidden file");
                continue;
            }
            paths.push(entry.into_path());
        }

        if self.format() == Format::Pbs {
            return self.pbs_file_paths(dir, paths);
        }
        Ok(paths)
    }

    /// PBS logs are named `YYYYMMDD`; today's file may still be written to.
    fn pbs_file_paths(&self, dir: &Path, paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let Some(max_date) = self.job_max_date()? else {
            debug!("No maximum date found in job table");
            return Ok(paths
                .into_iter()
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.len() == 8 && name.bytes().all(|b| b.is_ascii_digit()))
                })
                .collect());
        };

        debug!(%max_date, "Shredding PBS files after maximum date");
        let today = Utc::now().date_naive();
        let mut paths = Vec::new();
        let mut date = max_date.checked_add_days(Days::new(1));
        while let Some(current) = date
            && current < today
        {
            let path = dir.join(current.format("%Y%m%d").to_string());
            if path.is_file() {
                paths.push(path);
            } else {
                debug!(path = %path.display(), "Skipping missing file");
            }
            date = current.checked_add_days(Days::new(1));
        }
        Ok(paths)
    }

    /// Shreds one file inside a single transaction. Duplicate rows are
    /// counted and skipped; any other failure rolls the whole file back.
    pub fn shred_file(&mut self, path: &Path) -> Result<usize> {
        info!(file = %path.display(), "Shredding file");
        if !path.is_file() {
            error!(file = %path.display(), "Not a file");
            return Err(ShredError::NotAFile(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);

        debug!("Starting database transaction");
        self.db.begin_transaction()?;
        let shredded = if self.format() == Format::SlurmJson {
            self.shred_json_document(path, reader)
        } else {
            self.shred_lines(path, reader)
        };
        match shredded {
            Ok((record_count, duplicate_count)) => {
                debug!("Committing database transaction");
                self.db.commit()?;
                self.stats.files += 1;
                self.stats.records += record_count;
                self.stats.duplicates += duplicate_count;
                info!("Shredded {} records", record_count);
                if duplicate_count > 0 {
                    info!("Skipped {} duplicate records", duplicate_count);
                }
                Ok(record_count)
            }
            Err(err) => {
                debug!("Rolling back database transaction");
                if let Err(rollback_err) = self.db.roll_back() {
                    error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn shred_lines(&mut self, path: &Path, mut reader: impl BufRead) -> Result<(usize, usize)> {
        let file = path.display().to_string();
        let mut record_count = 0;
        let mut duplicate_count = 0;
        let mut line_number = 0;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;

            let line: String = String::from_utf8_lossy(&buf)
                .trim_end()
                .chars()
                .filter(|c| !matches!(*c, '\u{0}'..='\u{1f}' | '\u{7f}'))
                .collect();
            if line.is_empty() {
                debug!(file = %file, line_number, "Skipping blank line");
                continue;
            }

            record_count += 1;
            match self.shred_line(&line) {
                Ok(()) => {}
                Err(ShredError::Db(DbError::Duplicate(message))) => {
                    debug!(file = %file, line_number, line = %line, "Skipping duplicate data: {}", message);
                    duplicate_count += 1;
                }
                Err(err) => {
                    return Err(ShredError::Line {
                        file,
                        line_number,
                        line,
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok((record_count, duplicate_count))
    }

    /// A `sacct --json` document is one object whose `jobs` array holds the
    /// jobs; each element counts as one record.
    fn shred_json_document(&mut self, path: &Path, reader: impl BufRead) -> Result<(usize, usize)> {
        let file = path.display().to_string();
        let document: serde_json::Value = serde_json::from_reader(reader)
            .map_err(|err| ShredError::parse(format!("Malformed Slurm json in {}: {}", file, err)))?;
        let jobs = document
            .get("jobs")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| ShredError::parse(format!("No \"jobs\" array in {}", file)))?;

        let mut record_count = 0;
        let mut duplicate_count = 0;
        for (idx, job) in jobs.iter().enumerate() {
            record_count += 1;
            let input = job.to_string();
            match self.shred_json_job(&input, job) {
                Ok(()) => {}
                Err(ShredError::Db(DbError::Duplicate(message))) => {
                    debug!(file = %file, job = idx + 1, "Skipping duplicate data: {}", message);
                    duplicate_count += 1;
                }
                Err(err) => {
                    return Err(ShredError::Line {
                        file,
                        line_number: idx + 1,
                        line: input,
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok((record_count, duplicate_count))
    }
}
