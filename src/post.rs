//! Assembles the WXR `<item>` fragment for one exported photo.

use std::collections::BTreeMap;

use anyhow::Context as _;
use chrono::NaiveDateTime;

use crate::attachments::{AttachmentRegistry, AttachmentRequest};
use crate::flickr::UserLookup;
use crate::ids::IdAllocator;
use crate::meta::{self, PhotoMeta};
use crate::slug::slugify;
use crate::wxr;

/// Every exported photo becomes a standard post with the image format.
pub const POST_TYPE: &str = "post";
const POST_FORMAT: &str = "image";

/// Shared run state the builder mutates, owned by the orchestrator.
///
/// Tags are keyed by slug; a later photo reusing a slug replaces the
/// stored label, so the label that survives is the last spelling seen.
pub struct BuildContext<'a> {
    pub alloc: &'a mut IdAllocator,
    pub registry: &'a mut AttachmentRegistry,
    pub users: &'a mut UserLookup,
    pub tags: &'a mut BTreeMap<String, String>,
}

/// One validated photo, ready for record assembly.
#[derive(Debug)]
pub struct PhotoInput<'a> {
    pub photo_id: &'a str,
    pub meta: &'a PhotoMeta,
    pub taken: NaiveDateTime,
    pub original_url: &'a str,
    /// Basename of the original URL; also the uploaded file's name.
    pub filename: &'a str,
}

#[derive(Debug)]
pub struct BuiltPost {
    pub post_id: u64,
    pub fragment: String,
    pub comment_count: u64,
}

/// Builds the complete post fragment: taxonomy, post-meta, comments, and
/// the thumbnail attachment registration.
///
/// ID ordering invariant: comment and attachment IDs are consumed during
/// assembly and never rolled back, while the post ID itself is consumed
/// only at the very end. Validation failures must therefore be decided
/// before calling this function (see [`PhotoMeta::required`]), so a
/// skipped photo consumes nothing.
pub fn build(ctx: &mut BuildContext, input: &PhotoInput) -> anyhow::Result<BuiltPost> {
    let meta = input.meta;

    let title = meta
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(input.photo_id);
    let slug = slugify(title);

    let mut taxonomy = String::new();
    for tag in &meta.tags {
        let tag_slug = slugify(&tag.tag);
        taxonomy.push_str(&wxr::tag_category_fragment(&tag_slug, &tag.tag));
        ctx.tags.insert(tag_slug, tag.tag.clone());
    }
    taxonomy.push_str(&wxr::format_category_fragment(POST_FORMAT));

    let status = match meta.privacy.as_deref() {
        Some(privacy) if !privacy.is_empty() && privacy != "public" => "private",
        _ => "publish",
    };

    let mut postmeta = String::new();
    for (field, value) in meta.archive_fields() {
        postmeta.push_str(&wxr::postmeta_fragment(&format!("_flickr_{field}"), value));
    }
    if let Some(exif) = &meta.exif
        && !exif.is_empty()
    {
        let serialized = serde_json::to_string(exif).context("serialize exif")?;
        postmeta.push_str(&wxr::postmeta_fragment("_flickr_exif", &serialized));
    }
    if !meta.albums.is_empty() {
        let album_ids: Vec<&str> = meta.albums.iter().map(|album| album.id.as_str()).collect();
        let serialized = serde_json::to_string(&album_ids).context("serialize album ids")?;
        postmeta.push_str(&wxr::postmeta_fragment("_flickr_album_ids", &serialized));
    }

    let mut comments = String::new();
    let mut comment_count = 0;
    for comment in &meta.comments {
        let author = ctx.users.resolve(&comment.user);
        // Comment timestamps are occasionally absent or garbled; the
        // photo's own capture time stands in rather than dropping the
        // comment.
        let date = comment
            .date
            .as_deref()
            .and_then(|raw| meta::parse_timestamp(raw).ok())
            .unwrap_or(input.taken);
        let comment_id = ctx.alloc.next_comment();
        comments.push_str(&wxr::comment_fragment(&wxr::CommentFragment {
            id: comment_id,
            author_name: &author.display_name,
            author_url: &author.profile_url,
            date,
            body: &comment.comment,
        }));
        comment_count += 1;
    }

    // The attachment needs its parent post ID before that ID is consumed.
    let parent_post_id = ctx.alloc.peek_post();
    let thumbnail_id = ctx.registry.register(
        ctx.alloc,
        AttachmentRequest {
            source_url: input.original_url.to_owned(),
            filename: input.filename.to_owned(),
            publish_date: input.taken,
            parent_post_id,
        },
    );
    postmeta.push_str(&wxr::postmeta_fragment("_thumbnail_id", &thumbnail_id.to_string()));
    postmeta.push_str(&wxr::postmeta_fragment(
        "_original_thumbnail_id",
        &thumbnail_id.to_string(),
    ));

    let post_id = ctx.alloc.next_post();
    debug_assert_eq!(post_id, parent_post_id);

    let fragment = wxr::post_item_fragment(&wxr::PostItem {
        id: post_id,
        title,
        link: input.original_url,
        slug: &slug,
        status,
        post_type: POST_TYPE,
        content: meta.description.as_deref().unwrap_or_default(),
        taken: input.taken,
        taxonomy_xml: &taxonomy,
        postmeta_xml: &postmeta,
        comments_xml: &comments,
    });

    Ok(BuiltPost {
        post_id,
        fragment,
        comment_count,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::attachments::AttachmentRegistry;
    use crate::flickr::UserLookup;
    use crate::ids::IdAllocator;

    struct Fixture {
        alloc: IdAllocator,
        registry: AttachmentRegistry,
        users: UserLookup,
        tags: BTreeMap<String, String>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                alloc: IdAllocator::new(10),
                registry: AttachmentRegistry::new(),
                // Unroutable base: these tests use comment-free photos,
                // so no lookup should ever leave the process.
                users: UserLookup::new("http://127.0.0.1:1", "test-key").expect("build lookup"),
                tags: BTreeMap::new(),
            }
        }

        fn ctx(&mut self) -> BuildContext<'_> {
            BuildContext {
                alloc: &mut self.alloc,
                registry: &mut self.registry,
                users: &mut self.users,
                tags: &mut self.tags,
            }
        }
    }

    fn photo_meta(json: &str) -> PhotoMeta {
        serde_json::from_str(json).expect("parse photo meta")
    }

    fn build_one(fixture: &mut Fixture, photo_id: &str, meta: &PhotoMeta) -> BuiltPost {
        let required = meta.required().expect("photo meta is complete");
        let filename = required
            .original_url
            .rsplit('/')
            .next()
            .expect("url basename")
            .to_owned();
        let input = PhotoInput {
            photo_id,
            meta,
            taken: required.taken,
            original_url: &required.original_url,
            filename: &filename,
        };
        build(&mut fixture.ctx(), &input).expect("build post")
    }

    #[test]
    fn title_falls_back_to_the_photo_id() {
        let mut fixture = Fixture::new();
        let meta = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/img.jpg"}"#,
        );
        let built = build_one(&mut fixture, "12345", &meta);
        assert!(built.fragment.contains("<title>12345</title>"));
        assert!(built.fragment.contains("<wp:post_name>12345</wp:post_name>"));
    }

    #[test]
    fn privacy_other_than_public_becomes_private() {
        let mut fixture = Fixture::new();

        let friends = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/a.jpg", "privacy": "friends"}"#,
        );
        let built = build_one(&mut fixture, "1", &friends);
        assert!(built.fragment.contains("<wp:status><![CDATA[private]]></wp:status>"));

        let public = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/b.jpg", "privacy": "public"}"#,
        );
        let built = build_one(&mut fixture, "2", &public);
        assert!(built.fragment.contains("<wp:status><![CDATA[publish]]></wp:status>"));

        let absent = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/c.jpg"}"#,
        );
        let built = build_one(&mut fixture, "3", &absent);
        assert!(built.fragment.contains("<wp:status><![CDATA[publish]]></wp:status>"));
    }

    #[test]
    fn shared_tag_is_collected_once_with_last_label() {
        let mut fixture = Fixture::new();
        let first = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/a.jpg", "tags": [{"tag": "Sunset"}]}"#,
        );
        let second = photo_meta(
            r#"{"date_taken": "2019-01-30 10:35:00", "original": "https://x/b.jpg", "tags": [{"tag": "sunset"}]}"#,
        );

        let built_first = build_one(&mut fixture, "1", &first);
        let built_second = build_one(&mut fixture, "2", &second);

        assert!(built_first.fragment.contains(r#"nicename="sunset""#));
        assert!(built_second.fragment.contains(r#"nicename="sunset""#));
        assert_eq!(fixture.tags.len(), 1);
        assert_eq!(fixture.tags.get("sunset").map(String::as_str), Some("sunset"));
    }

    #[test]
    fn shared_original_url_reuses_one_attachment() {
        let mut fixture = Fixture::new();
        let meta = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/shared.jpg"}"#,
        );

        let first = build_one(&mut fixture, "1", &meta);
        let second = build_one(&mut fixture, "2", &meta);

        assert_eq!(fixture.registry.len(), 1);
        let thumbnail = "<wp:meta_key><![CDATA[_thumbnail_id]]></wp:meta_key><wp:meta_value><![CDATA[1001]]></wp:meta_value>";
        assert!(first.fragment.contains(thumbnail));
        assert!(second.fragment.contains(thumbnail));
        // The attachment stays parented to the first post that saw it.
        assert_eq!(fixture.registry.records()[0].parent_post_id, first.post_id);
        assert_ne!(first.post_id, second.post_id);
    }

    #[test]
    fn post_ids_are_sequential_in_build_order() {
        let mut fixture = Fixture::new();
        let meta = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/a.jpg"}"#,
        );
        for expected in 1..=3 {
            let built = build_one(&mut fixture, "1", &meta);
            assert_eq!(built.post_id, expected);
        }
    }

    #[test]
    fn archival_postmeta_is_prefixed_and_exif_serialized() {
        let mut fixture = Fixture::new();
        let meta = photo_meta(
            r#"{
                "date_taken": "2019-01-29 10:35:00",
                "original": "https://x/a.jpg",
                "count_views": "203",
                "photopage": "https://www.flickr.com/photos/u/1/",
                "exif": {"Camera": "X100"},
                "albums": [{"id": "72157"}, {"id": "72158"}]
            }"#,
        );
        let built = build_one(&mut fixture, "1", &meta);

        assert!(built.fragment.contains("<![CDATA[_flickr_count_views]]>"));
        assert!(built.fragment.contains("<![CDATA[203]]>"));
        assert!(built.fragment.contains("<![CDATA[_flickr_photopage]]>"));
        assert!(built.fragment.contains("<![CDATA[_flickr_original]]>"));
        assert!(built.fragment.contains("<![CDATA[_flickr_exif]]>"));
        assert!(built.fragment.contains(r#"{"Camera":"X100"}"#));
        assert!(built.fragment.contains("<![CDATA[_flickr_album_ids]]>"));
        assert!(built.fragment.contains(r#"["72157","72158"]"#));
    }

    #[test]
    fn image_format_term_is_always_attached() {
        let mut fixture = Fixture::new();
        let meta = photo_meta(
            r#"{"date_taken": "2019-01-29 10:35:00", "original": "https://x/a.jpg"}"#,
        );
        let built = build_one(&mut fixture, "1", &meta);
        assert!(built
            .fragment
            .contains(r#"<category domain="post_format" nicename="post-format-image"><![CDATA[Image]]></category>"#));
    }
}
