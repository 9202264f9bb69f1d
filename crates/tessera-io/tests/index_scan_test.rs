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

use anyhow::Result;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tessera_core::asset::{AssetMetadata, AssetSource, AssetUUID, ChunkLayout};
use tessera_core::vfs::{AssetIndex, VirtualFileSystem};
use tessera_io::{write_index, BlobStore, FsBlobStore, IndexBuilder};

fn write_wav(path: &Path, frames: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..frames {
        writer.write_sample(i as i16)?;
        writer.write_sample(-(i as i16))?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn scan_indexes_every_file_with_stable_ids() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("textures/ui"))?;
    fs::create_dir_all(dir.path().join("audio"))?;
    fs::write(dir.path().join("textures/ui/button.png"), b"png")?;
    fs::write(dir.path().join("textures/wall.PNG"), b"png2")?;
    fs::write(dir.path().join("notes.txt"), b"hello")?;
    write_wav(&dir.path().join("audio/theme.wav"), 100)?;

    let entries = IndexBuilder::new(dir.path()).scan()?;
    let paths: Vec<PathBuf> = entries.iter().map(|e| e.source_path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("audio/theme.wav"),
            PathBuf::from("notes.txt"),
            PathBuf::from("textures/ui/button.png"),
            PathBuf::from("textures/wall.PNG"),
        ]
    );

    let button = &entries[2];
    assert_eq!(button.uuid, AssetUUID::new_v5("textures/ui/button.png"));
    assert_eq!(button.asset_type_name, "png");
    assert_eq!(entries[3].asset_type_name, "png");
    assert!(button.chunk_layout.is_none());

    match &entries[0].chunk_layout {
        Some(ChunkLayout::Pcm {
            sample_rate,
            channels,
            sample_width,
            data_offset,
            data_len,
        }) => {
            assert_eq!(*sample_rate, 8000);
            assert_eq!(*channels, 2);
            assert_eq!(*sample_width, 2);
            assert_eq!(*data_len, 400);
            let file_len = fs::metadata(dir.path().join("audio/theme.wav"))?.len();
            assert_eq!(*data_offset + *data_len, file_len);
        }
        other => panic!("expected a PCM layout, got {other:?}"),
    }
    Ok(())
}

#[test]
fn written_index_reloads_into_a_vfs() -> Result<()> {
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("assets/a"))?;
    fs::write(dir.path().join("assets/a/one.bin"), b"1")?;
    fs::write(dir.path().join("assets/two.bin"), b"22")?;

    let entries = IndexBuilder::new(dir.path().join("assets")).scan()?;
    let index_path = dir.path().join("index.bin");
    write_index(&entries, &index_path)?;

    let vfs = VirtualFileSystem::new(&fs::read(&index_path)?)?;
    assert_eq!(vfs.len(), 2);
    assert!(vfs.resolve(&AssetUUID::new_v5("a/one.bin")).is_some());
    assert_eq!(vfs.children(Path::new("a")).len(), 1);
    Ok(())
}

#[test]
fn fs_store_reads_loose_and_packed_sources() -> Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("loose.bin"), b"loose-bytes")?;
    let pack_path = dir.path().join("data.pack");
    fs::write(&pack_path, b"AAAApackedBBBB")?;

    let store = FsBlobStore::new(dir.path()).with_pack_file(&pack_path);

    let loose = AssetMetadata::loose(AssetUUID::new(), "loose.bin", "bin");
    assert_eq!(store.read_all(&loose)?, b"loose-bytes");

    let mut packed = AssetMetadata::loose(AssetUUID::new(), "packed.bin", "bin");
    packed.source = AssetSource::Packed { offset: 4, size: 6 };
    assert_eq!(store.read_all(&packed)?, b"packed");

    let mut stream = store.open_stream(&packed)?;
    stream.seek(SeekFrom::Start(3))?;
    let mut rest = String::new();
    stream.read_to_string(&mut rest)?;
    assert_eq!(rest, "ked");
    Ok(())
}

#[test]
fn packed_source_without_pack_file_is_not_found() {
    let dir = tempdir().unwrap();
    let store = FsBlobStore::new(dir.path());
    let mut packed = AssetMetadata::loose(AssetUUID::new(), "p.bin", "bin");
    packed.source = AssetSource::Packed { offset: 0, size: 1 };
    let err = store.read_all(&packed).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
