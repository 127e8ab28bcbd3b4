//! Read-only inventory of the export: what would be processed, and why
//! anything would be skipped. No files are written, no identifiers are
//! consumed, and the Flickr API is never called.

use std::path::Path;

use anyhow::Context as _;

use crate::cli::ScanArgs;
use crate::config::Config;
use crate::export;
use crate::meta;

pub fn run(args: ScanArgs) -> anyhow::Result<()> {
    let config = Config::load(Path::new(&args.config)).context("load config")?;
    let meta_dir = config.meta_dir();

    let mut total = 0_u64;
    let mut exportable = 0_u64;

    for data_dir in export::data_directories(&config.project_dir)? {
        println!("{}", data_dir.display());
        for image_path in export::image_files(&data_dir)? {
            let Some(file_name) = image_path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            let Some(photo_id) = export::photo_id_from_filename(file_name) else {
                println!("    {file_name}: not a photo file");
                continue;
            };
            total += 1;

            let meta_path = meta_dir.join(format!("photo_{photo_id}.json"));
            if !meta_path.is_file() {
                println!("    {photo_id}: missing meta file");
                continue;
            }

            match meta::load(&meta_path) {
                Err(err) => println!("    {photo_id}: unreadable meta ({err:#})"),
                Ok(photo_meta) => match photo_meta.required() {
                    Err(err) => println!("    {photo_id}: incomplete meta ({err:#})"),
                    Ok(_) => {
                        exportable += 1;
                        let title = photo_meta.name.as_deref().unwrap_or("(untitled)");
                        let extras = format!(
                            "{} tag(s), {} comment(s)",
                            photo_meta.tags.len(),
                            photo_meta.comments.len()
                        );
                        println!("    {photo_id} {title} ({extras})");
                    }
                },
            }
        }
    }

    println!("{exportable} of {total} photo(s) ready to export.");
    Ok(())
}
