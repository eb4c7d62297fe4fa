//! RRDtool pipe protocol: request lines, reply framing and argument builders.
//!
//! A request is a single line `"<command> <path> <args>\n"`. A reply is every
//! line read up to and including the first one starting with `"OK "` or
//! `"ERROR: "`.

use std::io::BufRead;
use std::path::Path;

use strum_macros::{AsRefStr, Display, EnumString};

use crate::schema::StorageSchema;
use crate::storage::StorageError;

/// Prefix of a successful terminal reply line.
const OK_PREFIX: &str = "OK ";

/// Prefix of a failed terminal reply line.
const ERROR_PREFIX: &str = "ERROR: ";

/// Seconds subtracted from the first update timestamp to get the creation
/// time, so creation strictly precedes the first update.
pub const CREATE_START_OFFSET: i64 = 10;

/// Longest data source name RRDtool accepts.
pub const DS_NAME_MAX_LEN: usize = 19;

/// Commands issued to the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum RrdCommand {
    Create,
    Update,
}

/// Format one request line.
pub fn request_line(command: RrdCommand, path: &Path, args: &str) -> String {
    format!("{} {} {}\n", command, path.display(), args)
}

/// One complete reply from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    lines: Vec<String>,
}

impl Reply {
    /// Whether the terminal line reports success.
    pub fn is_ok(&self) -> bool {
        self.lines
            .last()
            .is_some_and(|line| line.starts_with(OK_PREFIX))
    }

    /// Number of lines in the reply, terminal line included.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Reply lines joined for logging.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

fn is_terminal(line: &str) -> bool {
    line.starts_with(OK_PREFIX) || line.starts_with(ERROR_PREFIX)
}

/// Read one reply, accumulating lines until a terminal one.
///
/// EOF before any line yields [`StorageError::ChannelClosed`]; EOF after some
/// lines yields [`StorageError::TruncatedReply`].
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply, StorageError> {
    let mut lines = Vec::new();
    loop {
        let mut buf = String::new();
        if reader.read_line(&mut buf)? == 0 {
            return Err(if lines.is_empty() {
                StorageError::ChannelClosed
            } else {
                StorageError::TruncatedReply(lines.join("\n"))
            });
        }

        let line = buf.trim_end_matches(['\r', '\n']).to_string();
        let terminal = is_terminal(&line);
        lines.push(line);
        if terminal {
            return Ok(Reply { lines });
        }
    }
}

/// Turn a datasource name into a valid RRDtool data source name.
///
/// Characters outside `[A-Za-z0-9_]` become `_` and the result is cut to
/// [`DS_NAME_MAX_LEN`]. An empty name becomes `_`.
pub fn ds_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(DS_NAME_MAX_LEN)
        .collect();
    if name.is_empty() { "_".to_string() } else { name }
}

/// Arguments of a `create` command for the first sample at `timestamp`.
///
/// `--step <step> --start <timestamp-10>`, then one `RRA:` token per archive in
/// stored order, then the `DS:` token.
pub fn create_args(schema: &StorageSchema, timestamp: i64) -> String {
    let ds = &schema.datasource;
    let mut args = vec![
        "--step".to_string(),
        ds.step.to_string(),
        "--start".to_string(),
        (timestamp - CREATE_START_OFFSET).to_string(),
    ];

    args.extend(
        schema
            .archives
            .iter()
            .map(|rra| format!("RRA:{}:{}:{}:{}", rra.cf, rra.xff, rra.step, rra.rows)),
    );

    args.push(format!(
        "DS:{}:{}:{}:{}:{}",
        ds.name, ds.ds_type, ds.heartbeat, ds.min, ds.max
    ));

    args.join(" ")
}

/// Arguments of an `update` command: `<timestamp>:<value>`.
pub fn update_args(timestamp: i64, value: &str) -> String {
    format!("{timestamp}:{value}")
}
