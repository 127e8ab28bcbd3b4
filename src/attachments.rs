//! Media-library records, deduplicated by source URL.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::ids::IdAllocator;

/// One attachment destined for the WordPress media library.
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    pub id: u64,
    pub source_url: String,
    pub filename: String,
    pub publish_date: NaiveDateTime,
    pub parent_post_id: u64,
    pub title: Option<String>,
    pub excerpt: Option<String>,
}

/// What a post hands over when it wants its image in the media library.
#[derive(Debug, Clone)]
pub struct AttachmentRequest {
    pub source_url: String,
    pub filename: String,
    pub publish_date: NaiveDateTime,
    pub parent_post_id: u64,
}

/// Sole authority for the source-URL → attachment-ID mapping.
///
/// The URL index only ever grows during a run; repeat registrations of a
/// URL return the original ID and allocate nothing. The first
/// registration's filename and date win; later values for the same URL
/// are ignored, even when they differ.
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    records: Vec<AttachmentRecord>,
    ids_by_url: HashMap<String, u64>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, alloc: &mut IdAllocator, request: AttachmentRequest) -> u64 {
        if let Some(&id) = self.ids_by_url.get(&request.source_url) {
            return id;
        }

        let id = alloc.next_attachment();
        self.ids_by_url.insert(request.source_url.clone(), id);
        self.records.push(AttachmentRecord {
            id,
            source_url: request.source_url,
            filename: request.filename,
            publish_date: request.publish_date,
            parent_post_id: request.parent_post_id,
            title: None,
            excerpt: None,
        });

        id
    }

    /// Records in registration order, for final WXR emission.
    pub fn records(&self) -> &[AttachmentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDateTime {
        crate::meta::parse_timestamp(raw).expect("test timestamp")
    }

    fn request(url: &str, filename: &str, raw_date: &str, parent: u64) -> AttachmentRequest {
        AttachmentRequest {
            source_url: url.to_owned(),
            filename: filename.to_owned(),
            publish_date: date(raw_date),
            parent_post_id: parent,
        }
    }

    #[test]
    fn same_url_returns_same_id_every_time() {
        let mut alloc = IdAllocator::new(10);
        let mut registry = AttachmentRegistry::new();

        let first = registry.register(
            &mut alloc,
            request("https://x/img.jpg", "img.jpg", "2019-01-29 10:35:00", 1),
        );
        for _ in 0..5 {
            let again = registry.register(
                &mut alloc,
                request("https://x/img.jpg", "img.jpg", "2019-01-29 10:35:00", 1),
            );
            assert_eq!(again, first);
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_urls_get_distinct_sequential_ids() {
        let mut alloc = IdAllocator::new(0);
        let mut registry = AttachmentRegistry::new();

        let ids: Vec<u64> = (0..4)
            .map(|i| {
                registry.register(
                    &mut alloc,
                    request(
                        &format!("https://x/img{i}.jpg"),
                        &format!("img{i}.jpg"),
                        "2019-01-29 10:35:00",
                        i + 1,
                    ),
                )
            })
            .collect();

        assert_eq!(ids, [1001, 1002, 1003, 1004]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn first_registration_metadata_wins() {
        let mut alloc = IdAllocator::new(0);
        let mut registry = AttachmentRegistry::new();

        registry.register(
            &mut alloc,
            request("https://x/img.jpg", "first.jpg", "2019-01-29 10:35:00", 7),
        );
        registry.register(
            &mut alloc,
            request("https://x/img.jpg", "second.jpg", "2020-06-01 00:00:00", 9),
        );

        let record = &registry.records()[0];
        assert_eq!(record.filename, "first.jpg");
        assert_eq!(record.parent_post_id, 7);
        assert_eq!(record.publish_date, date("2019-01-29 10:35:00"));
    }

    #[test]
    fn records_preserve_registration_order() {
        let mut alloc = IdAllocator::new(0);
        let mut registry = AttachmentRegistry::new();

        registry.register(&mut alloc, request("https://x/b.jpg", "b.jpg", "2019-01-01 00:00:00", 1));
        registry.register(&mut alloc, request("https://x/a.jpg", "a.jpg", "2019-01-02 00:00:00", 2));

        let urls: Vec<&str> = registry.records().iter().map(|r| r.source_url.as_str()).collect();
        assert_eq!(urls, ["https://x/b.jpg", "https://x/a.jpg"]);
    }
}
