//! On-disk index of every ID ever issued.
//!
//! ## File layout
//!
//! ```text
//! offset 0..255   : JSON {"FilterN": uint, "FilterK": uint}, NUL-padded
//! offset 256..EOF : serialized Bloom filter state
//! ```
//!
//! The header region is always [`HEADER_SIZE`] bytes, independent of the JSON
//! length, so the header can grow without moving the filter state.
//!
//! ## Durability
//!
//! [`IndexFile::flush`] writes the whole file to `<path>.tmp`, syncs it and
//! renames it over `<path>`. The canonical path is never opened for writing,
//! so a failed or interrupted flush leaves the previous index intact.

use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    BloomFilter, DEFAULT_HASH_ROUNDS, Error, MAX_FILTER_BITS, MAX_HASH_ROUNDS, Result,
    default_filter_bits,
};

/// Size of the reserved header region at the start of the index file.
pub const HEADER_SIZE: usize = 256;

/// Suffix appended to the index path for the temporary file used by flushes.
pub const TMP_SUFFIX: &str = ".tmp";

/// Shortest ID length accepted when inferring the filter sizing.
pub const MIN_ID_LEN: usize = 3;

/// Sizing metadata stored in the header region.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// Length of the filter's bit array.
    #[serde(rename = "FilterN")]
    pub filter_n: u64,
    /// Number of hash rounds.
    #[serde(rename = "FilterK")]
    pub filter_k: u64,
}

impl IndexHeader {
    /// Infers the default sizing for IDs of `id_len` characters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no ID length was configured or it is
    /// shorter than [`MIN_ID_LEN`].
    pub fn infer(id_len: Option<usize>) -> Result<Self> {
        match id_len {
            Some(len) if len >= MIN_ID_LEN => Ok(Self {
                filter_n: default_filter_bits(len),
                filter_k: DEFAULT_HASH_ROUNDS,
            }),
            Some(len) => Err(Error::Config {
                reason: format!("idlen must be at least {MIN_ID_LEN}, got {len}"),
            }),
            None => Err(Error::Config {
                reason: "no index header found and no idlen configured to size a new index".into(),
            }),
        }
    }

    /// Creates an empty filter sized by this header.
    pub fn new_filter(&self) -> BloomFilter {
        BloomFilter::new(self.filter_n, self.filter_k)
    }

    /// Encodes the header as NUL-terminated JSON in a zeroed header region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeaderTooLarge`] if the JSON leaves no room for the
    /// terminating NUL.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let json = serde_json::to_vec(self)?;
        if json.len() >= HEADER_SIZE {
            return Err(Error::HeaderTooLarge { len: json.len() });
        }
        let mut region = [0_u8; HEADER_SIZE];
        region[..json.len()].copy_from_slice(&json);
        Ok(region)
    }

    /// Decodes a header region written by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Fails if the region has no NUL terminator, is not valid JSON, or
    /// describes an empty filter or one larger than [`MAX_FILTER_BITS`] bits
    /// or [`MAX_HASH_ROUNDS`] rounds.
    pub fn decode(region: &[u8; HEADER_SIZE]) -> Result<Self> {
        let end = region
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::InvalidHeader {
                reason: "missing NUL terminator".into(),
            })?;
        let header: Self = serde_json::from_slice(&region[..end])?;
        if header.filter_n == 0 || header.filter_k == 0 {
            return Err(Error::InvalidHeader {
                reason: format!(
                    "empty filter sizing n={}, k={}",
                    header.filter_n, header.filter_k
                ),
            });
        }
        if header.filter_n > MAX_FILTER_BITS || header.filter_k > MAX_HASH_ROUNDS {
            return Err(Error::InvalidHeader {
                reason: format!(
                    "filter sizing out of range n={}, k={}",
                    header.filter_n, header.filter_k
                ),
            });
        }
        Ok(header)
    }
}

/// How a [`LoadedIndex`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Header and filter state were both read from disk.
    Restored,
    /// No usable header was found; sizing was inferred and the filter is
    /// empty.
    Created,
    /// The header was read but the filter state could not be decoded. The
    /// filter is empty, so previously issued IDs are no longer remembered.
    Degraded,
}

/// An index loaded into memory.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub header: IndexHeader,
    pub filter: BloomFilter,
    pub state: LoadState,
}

/// Location of an index file and its temporary sibling.
#[derive(Debug, Clone)]
pub struct IndexFile {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl IndexFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = OsString::from(path.as_os_str());
        tmp.push(TMP_SUFFIX);
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Opens (creating if absent) and reads the index.
    ///
    /// A missing or unreadable header falls back to [`IndexHeader::infer`]
    /// with `id_len`. Filter state is only read when the header was valid; a
    /// decode failure yields an empty filter and [`LoadState::Degraded`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or if the header is
    /// unusable and no valid `id_len` was given.
    pub fn load(&self, id_len: Option<usize>) -> Result<LoadedIndex> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let header = match read_header(&mut file) {
            Ok(header) => header,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Header decode error in {}: {_e}", self.path.display());
                let header = IndexHeader::infer(id_len)?;
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "Creating index {} with n={}, k={}",
                    self.path.display(),
                    header.filter_n,
                    header.filter_k
                );
                return Ok(LoadedIndex {
                    filter: header.new_filter(),
                    header,
                    state: LoadState::Created,
                });
            }
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Loading index {} with n={}, k={}",
            self.path.display(),
            header.filter_n,
            header.filter_k
        );

        let mut state = Vec::new();
        let restored = file
            .read_to_end(&mut state)
            .map_err(Error::from)
            .and_then(|_| BloomFilter::from_state(header.filter_n, header.filter_k, &state));

        Ok(match restored {
            Ok(filter) => LoadedIndex {
                header,
                filter,
                state: LoadState::Restored,
            },
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    "Filter decode error in {}, continuing with an empty index: {_e}",
                    self.path.display()
                );
                LoadedIndex {
                    filter: header.new_filter(),
                    header,
                    state: LoadState::Degraded,
                }
            }
        })
    }

    /// Atomically replaces the index file with `header` and `filter`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, writing, syncing or renaming fails. The
    /// file at [`Self::path`] is unchanged in every failure case.
    pub fn flush(&self, header: &IndexHeader, filter: &BloomFilter) -> Result<usize> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Writing {}", self.tmp_path.display());

        let written = self.write_tmp(header, filter)?;
        fs::rename(&self.tmp_path, &self.path)?;

        #[cfg(feature = "tracing")]
        tracing::info!("Wrote {written} bytes to {}", self.path.display());
        Ok(written)
    }

    /// Writes and syncs the temporary file without promoting it.
    fn write_tmp(&self, header: &IndexHeader, filter: &BloomFilter) -> Result<usize> {
        let region = header.encode()?;
        let state = filter.encode_state();

        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        tmp.write_all(&region)?;
        tmp.write_all(&state)?;
        tmp.sync_all()?;
        Ok(HEADER_SIZE + state.len())
    }
}

fn read_header(file: &mut File) -> Result<IndexHeader> {
    let mut region = [0_u8; HEADER_SIZE];
    file.read_exact(&mut region)?;
    IndexHeader::decode(&region)
}
