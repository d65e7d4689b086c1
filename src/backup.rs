use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::profile::{PlayerProfile, ProfileStore};
use crate::store::{Document, KvSlot, LmsStore};

const MANIFEST_ENTRY: &str = "manifest.json";
const DOCUMENT_ENTRY: &str = "lms/document.json";
const PROFILE_ENTRY: &str = "lms/profile.json";
pub const BUNDLE_FORMAT_V1: &str = "lms-store-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub users: usize,
    pub courses: usize,
}

pub fn export_store_bundle(slot: &dyn KvSlot, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let document = LmsStore::new(slot).load()?;
    let profile = ProfileStore::new(slot).load()?;
    let document_text =
        serde_json::to_string_pretty(&document).context("failed to serialize document")?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "documentSha256": format!("{:x}", Sha256::digest(document_text.as_bytes())),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DOCUMENT_ENTRY, opts)
        .context("failed to start document entry")?;
    zip.write_all(document_text.as_bytes())
        .context("failed to write document entry")?;

    zip.start_file(PROFILE_ENTRY, opts)
        .context("failed to start profile entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&profile)
            .context("failed to serialize profile")?
            .as_bytes(),
    )
    .context("failed to write profile entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
    })
}

/// Verifies the manifest and checksum before touching the slot, then
/// overwrites the document and profile keys in place.
pub fn import_store_bundle(in_path: &Path, slot: &dyn KvSlot) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut document_text = String::new();
    archive
        .by_name(DOCUMENT_ENTRY)
        .context("bundle missing lms/document.json")?
        .read_to_string(&mut document_text)
        .context("failed to read document entry")?;

    if let Some(expected) = manifest.get("documentSha256").and_then(|v| v.as_str()) {
        let actual = format!("{:x}", Sha256::digest(document_text.as_bytes()));
        if actual != expected {
            return Err(anyhow!(
                "document checksum mismatch: expected {}, got {}",
                expected,
                actual
            ));
        }
    }

    let document: Document =
        serde_json::from_str(&document_text).context("document entry is invalid JSON")?;

    let profile: Option<PlayerProfile> = match archive.by_name(PROFILE_ENTRY) {
        Ok(mut entry) => {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .context("failed to read profile entry")?;
            Some(serde_json::from_str(&text).context("profile entry is invalid JSON")?)
        }
        Err(_) => None,
    };

    let compact = serde_json::to_string(&document).context("failed to serialize document")?;
    slot.set(crate::store::DB_KEY, &compact)?;
    if let Some(profile) = profile {
        ProfileStore::new(slot).restore(&profile)?;
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        users: document.users.len(),
        courses: document.courses.len(),
    })
}
