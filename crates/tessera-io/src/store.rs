// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Synchronous storage primitives used by the server-side caches.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tessera_core::asset::{AssetMetadata, AssetSource};

/// A seekable byte stream over one asset.
pub trait AssetStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> AssetStream for T {}

/// The backing store the caches read from.
pub trait BlobStore: Send + Sync {
    /// Reads the complete asset described by `locator`.
    fn read_all(&self, locator: &AssetMetadata) -> io::Result<Vec<u8>>;

    /// Opens a seekable stream positioned at the first byte of the asset.
    fn open_stream(&self, locator: &AssetMetadata) -> io::Result<Box<dyn AssetStream>>;
}

/// A store reading loose files under a root directory and packed assets from
/// an optional `data.pack`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    pack_file: Option<PathBuf>,
}

impl FsBlobStore {
    /// Creates a store for loose files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pack_file: None,
        }
    }

    /// Enables packed sources, read from `pack_file`.
    pub fn with_pack_file(mut self, pack_file: impl Into<PathBuf>) -> Self {
        self.pack_file = Some(pack_file.into());
        self
    }

    /// The root directory of loose files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_pack(&self) -> io::Result<File> {
        let path = self.pack_file.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "packed asset requested but no pack file is configured",
            )
        })?;
        File::open(path)
    }
}

impl BlobStore for FsBlobStore {
    fn read_all(&self, locator: &AssetMetadata) -> io::Result<Vec<u8>> {
        match &locator.source {
            AssetSource::Path(path) => std::fs::read(self.root.join(path)),
            AssetSource::Packed { offset, size } => {
                let mut pack = self.open_pack()?;
                let mut buffer = vec![0; *size as usize];
                pack.seek(SeekFrom::Start(*offset))?;
                pack.read_exact(&mut buffer)?;
                Ok(buffer)
            }
        }
    }

    fn open_stream(&self, locator: &AssetMetadata) -> io::Result<Box<dyn AssetStream>> {
        match &locator.source {
            AssetSource::Path(path) => Ok(Box::new(File::open(self.root.join(path))?)),
            AssetSource::Packed { offset, size } => {
                let window = PackWindow::new(self.open_pack()?, *offset, *size)?;
                Ok(Box::new(window))
            }
        }
    }
}

/// A `Read + Seek` view of the byte range `[offset, offset + len)` of an
/// underlying stream. Positions are relative to the start of the window.
#[derive(Debug)]
pub struct PackWindow<R> {
    inner: R,
    offset: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> PackWindow<R> {
    /// Creates the window and positions the underlying stream at its start.
    pub fn new(mut inner: R, offset: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            inner,
            offset,
            len,
            pos: 0,
        })
    }
}

impl<R: Read + Seek> Read for PackWindow<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let max = buf.len().min(remaining as usize);
        let n = self.inner.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for PackWindow<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        }
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of pack window")
        })?;

        self.inner.seek(SeekFrom::Start(self.offset + target))?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn window_clamps_reads_to_its_range() {
        let data: Vec<u8> = (0u8..32).collect();
        let mut window = PackWindow::new(Cursor::new(data), 8, 4).unwrap();

        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![8, 9, 10, 11]);

        window.seek(SeekFrom::Start(2)).unwrap();
        let mut two = [0u8; 8];
        let n = window.read(&mut two).unwrap();
        assert_eq!(&two[..n], &[10, 11]);
    }

    #[test]
    fn window_seek_from_end_is_relative_to_window() {
        let data: Vec<u8> = (0u8..32).collect();
        let mut window = PackWindow::new(Cursor::new(data), 10, 10).unwrap();
        assert_eq!(window.seek(SeekFrom::End(-1)).unwrap(), 9);
        let mut one = [0u8; 1];
        window.read_exact(&mut one).unwrap();
        assert_eq!(one[0], 19);
        assert!(window.seek(SeekFrom::Current(-20)).is_err());
    }
}
