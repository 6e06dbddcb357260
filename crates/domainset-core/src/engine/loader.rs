//! Stream-to-set loader
//!
//! Parses a newline-delimited domain list into a fresh normalized set and
//! installs it in the registry entry under the entry's write lock. The
//! scratch set is built entirely off-lock; readers never observe a partial
//! load.
//!
//! Community-curated lists occasionally carry malformed lines, so a bounded
//! number of normalization failures is tolerated. A file where failures
//! outnumber good lines is almost certainly not a domain list at all, and
//! the load is rejected so a bogus fetch cannot wipe a working set.

use std::collections::HashSet;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::error;

use crate::error::{Error, Result};
use crate::normalize::DomainNormalizer;
use crate::registry::DbEntry;
use crate::SERVICE;

/// Normalization failures tolerated per load; scanning stops at the cap.
pub(crate) const MAX_LOAD_FAILURES: usize = 10;

/// Read domains from `reader` until EOF and swap the resulting set into
/// `entry`.
///
/// Empty lines and lines whose first byte is `#` are skipped. The reader is
/// not closed here; dropping it is the caller's business (it may be the
/// read half of a tee that is still owed an error).
///
/// Returns the number of distinct domains loaded.
pub(crate) async fn load_into_entry<R>(
    reader: R,
    name: &str,
    normalizer: &DomainNormalizer,
    entry: &DbEntry,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut domains: HashSet<String> = HashSet::new();
    let mut failures: Vec<String> = Vec::new();
    let mut good_lines: usize = 0;

    while failures.len() < MAX_LOAD_FAILURES {
        let Some(line) = lines.next_line().await.map_err(Error::from_read_error)? else {
            break;
        };

        if line.is_empty() || line.as_bytes()[0] == b'#' {
            continue;
        }

        match normalizer.normalize(&line) {
            Ok(domain) => {
                domains.insert(domain);
                good_lines += 1;
            }
            Err(err) => {
                error!(
                    service = SERVICE,
                    database_name = %name,
                    domain_name = %line,
                    error = %err,
                    "failed to normalize domain name"
                );
                failures.push(format!("\"{line}\": {err}"));
            }
        }
    }

    if failures.len() > good_lines {
        return Err(Error::LoadParse {
            name: name.to_string(),
            failures: failures.len(),
            good: good_lines,
            detail: failures.join("; "),
        });
    }

    let count = domains.len();
    entry.replace(domains);
    Ok(count)
}
