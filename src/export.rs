//! Export orchestration: discovery, per-photo processing, final write.
//!
//! One photo is fully processed (image placement, lookups, record
//! assembly) before the next begins; all run state lives in this
//! function's locals and is handed to the builder by reference.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{NaiveDateTime, Utc};

use crate::attachments::AttachmentRegistry;
use crate::cli::ExportArgs;
use crate::config::Config;
use crate::flickr::UserLookup;
use crate::ids::IdAllocator;
use crate::meta;
use crate::post;
use crate::report::RunReport;
use crate::wxr;

pub fn run(args: ExportArgs) -> anyhow::Result<()> {
    let config = Config::load(Path::new(&args.config)).context("load config")?;
    let origin = args
        .origin
        .filter(|origin| !origin.is_empty())
        .unwrap_or_else(default_origin);

    let meta_dir = config.meta_dir();
    let uploads_dir = config.uploads_dir();
    let wxr_dir = config.wxr_dir();
    fs::create_dir_all(&uploads_dir)
        .with_context(|| format!("create uploads dir: {}", uploads_dir.display()))?;
    fs::create_dir_all(&wxr_dir)
        .with_context(|| format!("create wxr dir: {}", wxr_dir.display()))?;

    let photo_count = count_meta_files(&meta_dir)?;
    tracing::info!(photo_count, "scanned metadata directory");

    let mut alloc = IdAllocator::new(photo_count);
    let mut registry = AttachmentRegistry::new();
    let mut users = UserLookup::new(config.api_base(), &config.flickr_api_key)
        .context("build flickr lookup client")?;
    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    let mut report = RunReport::new();
    let mut post_counts: HashMap<&'static str, u64> = HashMap::new();
    let mut posts = wxr::ChunkBuffer::new(config.wxr_output_size_limit);

    for data_dir in data_directories(&config.project_dir)? {
        tracing::info!(dir = %data_dir.display(), "processing image directory");
        for image_path in image_files(&data_dir)? {
            let Some(file_name) = image_path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(photo_id) = photo_id_from_filename(file_name) else {
                report.warn(format!(
                    "file {} does not appear to be a regular photo, skipping",
                    image_path.display()
                ));
                continue;
            };

            let mut ctx = post::BuildContext {
                alloc: &mut alloc,
                registry: &mut registry,
                users: &mut users,
                tags: &mut tags,
            };
            match export_photo(&config, &image_path, photo_id, &mut ctx) {
                Ok(built) => {
                    tracing::debug!(
                        photo_id,
                        post_id = built.post_id,
                        comments = built.comment_count,
                        "exported photo"
                    );
                    posts.append(&built.fragment);
                    *post_counts.entry(post::POST_TYPE).or_insert(0) += 1;
                }
                Err(err) => report.warn(format!("{photo_id}: {err:#}, skipping")),
            }
        }
    }

    // Tag IDs exist only from here on: the set is complete, deduplicated
    // by slug, and the BTreeMap iterates in slug order.
    let mut tag_output = String::new();
    for (slug, label) in &tags {
        if slug.is_empty() || label.is_empty() {
            continue;
        }
        tag_output.push_str(&wxr::term_fragment(alloc.next_tag(), slug, label));
    }

    let mut attachments = wxr::ChunkBuffer::new(config.wxr_output_size_limit);
    for record in registry.records() {
        attachments.append(&wxr::attachment_item_fragment(record, &origin));
    }

    tracing::info!("cleaning up old export files, if they exist");
    clean_stale_outputs(&wxr_dir)?;

    let post_chunks = posts.finalize();
    let attachment_chunks = attachments.finalize();
    write_outputs(
        &wxr_dir,
        args.split,
        &tag_output,
        &post_chunks,
        &attachment_chunks,
    )?;

    let mut type_counts: Vec<String> = post_counts
        .iter()
        .map(|(post_type, count)| format!("{} {post_type}(s)", group_thousands(*count)))
        .collect();
    type_counts.sort();
    let exported = if type_counts.is_empty() {
        "0 post(s)".to_owned()
    } else {
        type_counts.join(", ")
    };
    println!(
        "Exported {exported}, {} tags, {} comments and {} attachment(s).",
        group_thousands(alloc.tags_allocated()),
        group_thousands(alloc.comments_allocated()),
        group_thousands(registry.len() as u64),
    );

    if !report.is_clean() {
        eprintln!();
        eprintln!("Completed with {} warning(s):", report.warnings().len());
        for warning in report.warnings() {
            eprintln!("  - {warning}");
        }
    }

    Ok(())
}

/// Processes one photo end to end. Any error is a per-item skip for the
/// caller, and because validation and placement come before record
/// assembly, a skipped photo has consumed no identifiers.
fn export_photo(
    config: &Config,
    image_path: &Path,
    photo_id: &str,
    ctx: &mut post::BuildContext,
) -> anyhow::Result<post::BuiltPost> {
    let meta_path = config.meta_dir().join(format!("photo_{photo_id}.json"));
    if !meta_path.is_file() {
        anyhow::bail!("could not read meta file for ID {photo_id}");
    }
    let photo_meta = meta::load(&meta_path)?;
    let required = photo_meta.required().context("incomplete metadata")?;

    let filename = url_basename(&required.original_url);
    place_image(
        image_path,
        &config.uploads_dir(),
        required.taken,
        &filename,
        config.move_images,
    )?;

    post::build(
        ctx,
        &post::PhotoInput {
            photo_id,
            meta: &photo_meta,
            taken: required.taken,
            original_url: &required.original_url,
            filename: &filename,
        },
    )
}

/// Copies or moves the source image to `uploads/YYYY/MM/<filename>`.
/// An already-present destination is left untouched, which makes re-runs
/// cheap and safe.
fn place_image(
    source: &Path,
    uploads_dir: &Path,
    taken: NaiveDateTime,
    filename: &str,
    move_images: bool,
) -> anyhow::Result<()> {
    let bucket = uploads_dir.join(taken.format("%Y/%m").to_string());
    let destination = bucket.join(filename);
    if destination.exists() {
        return Ok(());
    }

    fs::create_dir_all(&bucket)
        .with_context(|| format!("create uploads dir: {}", bucket.display()))?;

    if move_images {
        fs::rename(source, &destination).with_context(|| {
            format!(
                "move image {} to {}",
                source.display(),
                destination.display()
            )
        })?;
    } else {
        fs::copy(source, &destination).with_context(|| {
            format!(
                "copy image {} to {}",
                source.display(),
                destination.display()
            )
        })?;
    }

    Ok(())
}

/// The `data-download-N` directories of the export, sorted by name.
pub fn data_directories(project_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = fs::read_dir(project_dir)
        .with_context(|| format!("read project dir: {}", project_dir.display()))?;
    for entry in entries {
        let entry = entry.context("read project dir entry")?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(suffix) = name.strip_prefix("data-download-") else {
            continue;
        };
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Regular files of one data directory, sorted by name.
pub fn image_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("read data dir: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("read data dir entry")?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Extracts the numeric photo ID from the two original-download filename
/// shapes: `<words>_<id>_o.jpg` and `<id>_<hash>_o.jpg`.
pub fn photo_id_from_filename(name: &str) -> Option<&str> {
    let stem = name.strip_suffix("_o.jpg")?;

    if let Some((prefix, id)) = stem.rsplit_once('_')
        && !prefix.is_empty()
        && !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_digit())
    {
        return Some(id);
    }

    if let Some((id, rest)) = stem.split_once('_')
        && !id.is_empty()
        && !rest.is_empty()
        && id.bytes().all(|b| b.is_ascii_digit())
    {
        return Some(id);
    }

    None
}

/// Filename component of a source URL.
pub fn url_basename(raw: &str) -> String {
    let path = match url::Url::parse(raw) {
        Ok(parsed) => parsed.path().to_owned(),
        Err(_) => raw.to_owned(),
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(&path)
        .to_owned()
}

/// Meta files look like `photo_<digits>.json`. A missing meta directory
/// just means zero photos; every image file will then be skipped with
/// its own warning.
fn count_meta_files(meta_dir: &Path) -> anyhow::Result<u64> {
    if !meta_dir.is_dir() {
        tracing::warn!(dir = %meta_dir.display(), "meta directory not found");
        return Ok(0);
    }

    let mut count = 0;
    let entries = fs::read_dir(meta_dir)
        .with_context(|| format!("read meta dir: {}", meta_dir.display()))?;
    for entry in entries {
        let entry = entry.context("read meta dir entry")?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = name
            .strip_prefix("photo_")
            .and_then(|rest| rest.strip_suffix(".json"))
            && !id.is_empty()
            && id.bytes().all(|b| b.is_ascii_digit())
        {
            count += 1;
        }
    }
    Ok(count)
}

/// Removes `*.wxr` leftovers from a previous run so output files never
/// mix generations.
fn clean_stale_outputs(wxr_dir: &Path) -> anyhow::Result<()> {
    let entries =
        fs::read_dir(wxr_dir).with_context(|| format!("read wxr dir: {}", wxr_dir.display()))?;
    for entry in entries {
        let entry = entry.context("read wxr dir entry")?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("wxr") {
            fs::remove_file(&path)
                .with_context(|| format!("remove stale export file: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "removed stale export file");
        }
    }
    Ok(())
}

fn write_outputs(
    wxr_dir: &Path,
    split: bool,
    tag_output: &str,
    post_chunks: &[String],
    attachment_chunks: &[String],
) -> anyhow::Result<()> {
    if !split {
        let mut parts: Vec<&str> = vec![wxr::AUTHOR_BLOCK, tag_output];
        parts.extend(post_chunks.iter().map(String::as_str));
        parts.extend(attachment_chunks.iter().map(String::as_str));
        write_document(&wxr_dir.join("000-combined.wxr"), &parts)?;
        return Ok(());
    }

    // One file per category; posts and attachments additionally split by
    // the size threshold.
    write_document(&wxr_dir.join("001-authors.wxr"), &[wxr::AUTHOR_BLOCK])?;
    write_document(&wxr_dir.join("002-tags.wxr"), &[tag_output])?;
    for (index, chunk) in post_chunks.iter().enumerate() {
        let name = format!("003-posts-{:03}.wxr", index + 1);
        write_document(&wxr_dir.join(name), &[chunk])?;
    }
    for (index, chunk) in attachment_chunks.iter().enumerate() {
        let name = format!("004-attachments-{:03}.wxr", index + 1);
        write_document(&wxr_dir.join(name), &[chunk])?;
    }
    Ok(())
}

fn write_document(path: &Path, parts: &[&str]) -> anyhow::Result<()> {
    let mut document = String::from(wxr::WXR_HEADER);
    for part in parts {
        document.push_str(part);
    }
    document.push_str(wxr::WXR_FOOTER);

    fs::write(path, document)
        .with_context(|| format!("write wxr document: {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote export document");
    Ok(())
}

fn default_origin() -> String {
    format!("flickrphotos-{}", Utc::now().format("%Y%m%d%H%M%S"))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, c) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_id_comes_from_either_filename_shape() {
        assert_eq!(
            photo_id_from_filename("sunset-hills_1001_o.jpg"),
            Some("1001")
        );
        assert_eq!(photo_id_from_filename("x_42_o.jpg"), Some("42"));
        assert_eq!(
            photo_id_from_filename("1002_deadbeef_o.jpg"),
            Some("1002")
        );
        assert_eq!(photo_id_from_filename("a_b_77_o.jpg"), Some("77"));
    }

    #[test]
    fn non_photo_filenames_are_rejected() {
        assert_eq!(photo_id_from_filename("notes.txt"), None);
        assert_eq!(photo_id_from_filename("photo.jpg"), None);
        assert_eq!(photo_id_from_filename("_o.jpg"), None);
        assert_eq!(photo_id_from_filename("123_o.jpg"), None);
        assert_eq!(photo_id_from_filename("abc_def_o.jpg"), None);
        assert_eq!(photo_id_from_filename("1001_o.png"), None);
    }

    #[test]
    fn url_basename_takes_the_last_path_segment() {
        assert_eq!(
            url_basename("https://live.staticflickr.com/65535/img_a.jpg"),
            "img_a.jpg"
        );
        assert_eq!(url_basename("https://x/img.jpg?size=o"), "img.jpg");
        assert_eq!(url_basename("plain-name.jpg"), "plain-name.jpg");
    }

    #[test]
    fn data_directories_filter_and_sort() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        for name in ["data-download-2", "data-download-1", "data-download-x", "meta", "data-download-10"] {
            fs::create_dir(temp.path().join(name)).expect("mkdir");
        }
        fs::write(temp.path().join("data-download-3"), b"file not dir").expect("write");

        let dirs = data_directories(temp.path()).expect("list data dirs");
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["data-download-1", "data-download-10", "data-download-2"]);
    }

    #[test]
    fn count_meta_files_only_counts_photo_json() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let meta_dir = temp.path().join("meta");
        fs::create_dir(&meta_dir).expect("mkdir");
        for name in ["photo_1.json", "photo_22.json", "photo_.json", "photo_x.json", "albums.json"] {
            fs::write(meta_dir.join(name), b"{}").expect("write");
        }

        assert_eq!(count_meta_files(&meta_dir).expect("count"), 2);
        assert_eq!(
            count_meta_files(&temp.path().join("missing")).expect("count"),
            0
        );
    }

    #[test]
    fn place_image_is_idempotent_and_buckets_by_date() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let source = temp.path().join("src.jpg");
        fs::write(&source, b"original bytes").expect("write source");
        let uploads = temp.path().join("uploads");
        let taken = meta::parse_timestamp("2019-01-29 10:35:00").expect("timestamp");

        place_image(&source, &uploads, taken, "img.jpg", false).expect("copy image");
        let destination = uploads.join("2019/01/img.jpg");
        assert_eq!(fs::read(&destination).expect("read dest"), b"original bytes");
        assert!(source.exists(), "copy must leave the source in place");

        // A changed source must not clobber an existing destination.
        fs::write(&source, b"changed").expect("rewrite source");
        place_image(&source, &uploads, taken, "img.jpg", false).expect("re-place image");
        assert_eq!(fs::read(&destination).expect("read dest"), b"original bytes");
    }

    #[test]
    fn place_image_move_removes_the_source() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let source = temp.path().join("src.jpg");
        fs::write(&source, b"bytes").expect("write source");
        let uploads = temp.path().join("uploads");
        let taken = meta::parse_timestamp("2020-07-04 09:30:00").expect("timestamp");

        place_image(&source, &uploads, taken, "img.jpg", true).expect("move image");
        assert!(!source.exists());
        assert!(uploads.join("2020/07/img.jpg").exists());
    }

    #[test]
    fn stale_wxr_files_are_removed_and_others_kept() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::write(temp.path().join("000-combined.wxr"), b"old").expect("write");
        fs::write(temp.path().join("notes.txt"), b"keep").expect("write");

        clean_stale_outputs(temp.path()).expect("clean");
        assert!(!temp.path().join("000-combined.wxr").exists());
        assert!(temp.path().join("notes.txt").exists());
    }

    #[test]
    fn group_thousands_inserts_separators() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
