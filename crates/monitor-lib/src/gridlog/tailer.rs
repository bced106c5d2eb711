//! Incremental reader for the day's grid log

use super::parser::{GridLogEntry, GridLogFilter, GridLogParser};
use super::GridLogConfig;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const GRID_LOG_FILE: &str = "GridLog.csv";

/// `{base}/{DD-Mon-YYYY}/GridLog.csv`
pub fn log_path_for(base: &Path, date: NaiveDate) -> PathBuf {
    base.join(date.format("%d-%b-%Y").to_string())
        .join(GRID_LOG_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLogStatus {
    pub log_path: Option<String>,
    pub file_exists: bool,
    pub position: u64,
    pub awaiting_continuation: bool,
}

/// Follows the current day's grid log, returning only rows appended since
/// the last poll.
///
/// A file already present the first time the tailer looks is skipped to its
/// end so old rows are not replayed. A new day's file is read from the start.
/// Incomplete trailing lines stay unread until their newline arrives.
pub struct GridLogTailer {
    base_path: PathBuf,
    filter: GridLogFilter,
    parser: GridLogParser,
    current_path: Option<PathBuf>,
    position: u64,
    skip_existing: bool,
}

impl GridLogTailer {
    pub fn new(config: &GridLogConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            filter: config.filter(),
            parser: GridLogParser::new(),
            current_path: None,
            position: 0,
            skip_existing: true,
        }
    }

    pub fn poll(&mut self) -> io::Result<Vec<GridLogEntry>> {
        self.poll_for(Local::now().date_naive())
    }

    pub fn poll_for(&mut self, date: NaiveDate) -> io::Result<Vec<GridLogEntry>> {
        let path = log_path_for(&self.base_path, date);
        if self.current_path.as_ref() != Some(&path) {
            if let Some(previous) = &self.current_path {
                info!(
                    previous = %previous.display(),
                    current = %path.display(),
                    "Grid log path changed"
                );
            }
            self.current_path = Some(path.clone());
            self.position = 0;
            self.parser = GridLogParser::new();
        }

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Grid log not present yet");
                self.skip_existing = false;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let len = file.metadata()?.len();
        if self.skip_existing {
            self.skip_existing = false;
            self.position = len;
            info!(path = %path.display(), offset = len, "Tailing grid log from end");
            return Ok(Vec::new());
        }

        if len < self.position {
            warn!(
                path = %path.display(),
                offset = self.position,
                len,
                "Grid log shrank, rereading from start"
            );
            self.position = 0;
            self.parser = GridLogParser::new();
        }
        if len == self.position {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.position))?;
        let mut buf = Vec::with_capacity((len - self.position) as usize);
        file.read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        self.position += complete.len() as u64;

        let text = String::from_utf8_lossy(complete);
        Ok(self.parser.feed_all(&text, &self.filter))
    }

    pub fn status(&self) -> GridLogStatus {
        GridLogStatus {
            log_path: self
                .current_path
                .as_ref()
                .map(|p| p.display().to_string()),
            file_exists: self.current_path.as_ref().is_some_and(|p| p.exists()),
            position: self.position,
            awaiting_continuation: self.parser.has_pending(),
        }
    }
}
