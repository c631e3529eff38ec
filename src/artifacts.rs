// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

//! Failure evidence bundles: a failed case's working directory packed into
//! a `.tar.gz` with a `bundle.toml` manifest.

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::{Archive, Builder, Header};

use crate::harness::CaseReport;

pub const MANIFEST_NAME: &str = "bundle.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BundleManifest {
    pub case: String,
    pub family: String,
    pub stage: String,
    pub failure_kind: Option<String>,
    pub failure: Option<String>,
    pub files: Vec<String>,
    pub checksums: BTreeMap<String, String>,
}

fn append(builder: &mut Builder<GzEncoder<File>>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, Cursor::new(data))
        .with_context(|| format!("failed to append {name}"))
}

/// Pack the working directory of `report` into `<out_dir>/<case>.tar.gz`.
pub fn bundle_case_dir(report: &CaseReport, out_dir: &Path) -> Result<PathBuf> {
    let case_dir = report
        .artifact_dir
        .as_ref()
        .ok_or_else(|| anyhow!("case {} left no working directory to bundle", report.case))?;

    let mut entries: Vec<PathBuf> = fs::read_dir(case_dir)
        .with_context(|| format!("unable to list {}", case_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    fs::create_dir_all(out_dir).with_context(|| format!("unable to create {}", out_dir.display()))?;
    let out_path = out_dir.join(format!("{}.tar.gz", report.case));
    let out_file =
        File::create(&out_path).with_context(|| format!("unable to create {}", out_path.display()))?;
    let mut builder = Builder::new(GzEncoder::new(out_file, Compression::default()));

    let mut files = Vec::with_capacity(entries.len());
    let mut checksums = BTreeMap::new();
    for path in &entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("artifact {} has no usable file name", path.display()))?
            .to_string();
        let data = fs::read(path).with_context(|| format!("failed to read artifact {}", path.display()))?;
        checksums.insert(name.clone(), format!("{:x}", Sha256::digest(&data)));
        append(&mut builder, &name, &data)?;
        files.push(name);
    }

    let manifest = BundleManifest {
        case: report.case.clone(),
        family: report.family.clone(),
        stage: report.reached.to_string(),
        failure_kind: report.failure_kind().map(|k| k.to_string()),
        failure: report.failure.as_ref().map(|e| e.to_string()),
        files,
        checksums,
    };
    let manifest_toml = toml::to_string_pretty(&manifest)?;
    append(&mut builder, MANIFEST_NAME, manifest_toml.as_bytes())?;

    builder.finish()?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(out_path)
}

/// Read the manifest back and check every listed file against its digest.
pub fn inspect_bundle(path: &Path) -> Result<BundleManifest> {
    let file = File::open(path).with_context(|| format!("unable to open bundle {}", path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut manifest_data = None;
    let mut digests = BTreeMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        if name == MANIFEST_NAME {
            manifest_data = Some(data);
        } else {
            digests.insert(name, format!("{:x}", Sha256::digest(&data)));
        }
    }

    let manifest_data = manifest_data.ok_or_else(|| anyhow!("{MANIFEST_NAME} not found in bundle"))?;
    let manifest: BundleManifest = toml::from_str(&String::from_utf8(manifest_data)?)?;
    if manifest.checksums != digests {
        return Err(anyhow!("bundle {} does not match its manifest checksums", path.display()));
    }
    Ok(manifest)
}
