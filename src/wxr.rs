//! WXR (WordPress eXtended RSS) rendering.
//!
//! Typed records are rendered into `<item>`/`<wp:term>` fragments here,
//! buffered into size-bounded chunks by [`ChunkBuffer`], and wrapped in
//! the shared channel envelope by the orchestrator. All textual payloads
//! go through CDATA or entity escaping; nothing user-controlled is ever
//! spliced into markup raw.

use chrono::NaiveDateTime;

use crate::attachments::AttachmentRecord;
use crate::slug::slugify;

/// Accumulates fragments for one output category and splits them into
/// size-bounded chunks.
///
/// The threshold is checked before a fragment is appended, so a chunk
/// can exceed the limit by at most one fragment. `finalize` always
/// pushes the trailing accumulator, so every category yields at least
/// one chunk, even with zero fragments.
#[derive(Debug)]
pub struct ChunkBuffer {
    limit: usize,
    current: String,
    done: Vec<String>,
}

impl ChunkBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            current: String::new(),
            done: Vec::new(),
        }
    }

    pub fn append(&mut self, fragment: &str) {
        if self.current.len() >= self.limit {
            self.done.push(std::mem::take(&mut self.current));
        }
        self.current.push_str(fragment);
    }

    pub fn finalize(mut self) -> Vec<String> {
        self.done.push(self.current);
        self.done
    }
}

pub const WXR_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>

<rss version="2.0"
 xmlns:blogChannel="http://backend.userland.com/blogChannelModule"
 xmlns:content="http://purl.org/rss/1.0/modules/content/"
 xmlns:dc="http://purl.org/dc/elements/1.1/"
 xmlns:excerpt="http://wordpress.org/export/1.2/excerpt/"
 xmlns:wfw="http://wellformedweb.org/CommentAPI/"
 xmlns:wp="http://wordpress.org/export/1.2/"
>

<channel>
<title>Flickr Photos</title>
<link>https://photos.test</link>
<description>Flickr Photos</description>
<language>en-US</language>
<pubDate>Tue, 29 Jan 2019 10:35:00 +0000</pubDate>
<generator>https://wordpress.org/?v=5.0</generator>
<wp:base_site_url>https://photos.test/</wp:base_site_url>
<wp:wxr_version>1.2</wp:wxr_version>
<wp:base_blog_url>https://photos.test/</wp:base_blog_url>

"#;

pub const WXR_FOOTER: &str = "</channel>\n</rss>\n";

/// The single import author every record is attributed to.
pub const AUTHOR_BLOCK: &str = r#"<wp:author>
	<wp:author_id>1</wp:author_id>
	<wp:author_login><![CDATA[admin]]></wp:author_login>
	<wp:author_email><![CDATA[admin@example.com]]></wp:author_email>
	<wp:author_display_name><![CDATA[Admin]]></wp:author_display_name>
	<wp:author_first_name><![CDATA[Admin]]></wp:author_first_name>
	<wp:author_last_name><![CDATA[Admin]]></wp:author_last_name>
</wp:author>
"#;

pub fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Wraps text in a CDATA section, splitting around any `]]>` so the
/// payload can never terminate the section early.
pub fn cdata(input: &str) -> String {
    format!("<![CDATA[{}]]>", input.replace("]]>", "]]]]><![CDATA[>"))
}

pub fn postmeta_fragment(key: &str, value: &str) -> String {
    format!(
        "<wp:postmeta><wp:meta_key>{}</wp:meta_key><wp:meta_value>{}</wp:meta_value></wp:postmeta>",
        cdata(key),
        cdata(value),
    )
}

pub fn tag_category_fragment(slug: &str, label: &str) -> String {
    format!(
        r#"<category domain="post_tag" nicename="{}">{}</category>"#,
        escape_text(slug),
        cdata(label),
    )
}

pub fn format_category_fragment(format: &str) -> String {
    format!(
        r#"<category domain="post_format" nicename="post-format-{}">{}</category>"#,
        escape_text(format),
        cdata(&ucfirst(format)),
    )
}

pub fn term_fragment(term_id: u64, slug: &str, label: &str) -> String {
    format!(
        "<wp:term><wp:term_id>{term_id}</wp:term_id><wp:term_taxonomy>post_tag</wp:term_taxonomy><wp:term_slug>{}</wp:term_slug><wp:term_name>{}</wp:term_name></wp:term>\n",
        escape_text(slug),
        cdata(label),
    )
}

/// One comment on a post, already resolved to display values.
#[derive(Debug)]
pub struct CommentFragment<'a> {
    pub id: u64,
    pub author_name: &'a str,
    pub author_url: &'a str,
    pub date: NaiveDateTime,
    pub body: &'a str,
}

pub fn comment_fragment(comment: &CommentFragment) -> String {
    let date = mysql_datetime(comment.date);
    format!(
        r#"<wp:comment>
    <wp:comment_id>{id}</wp:comment_id>
    <wp:comment_author>{author}</wp:comment_author>
    <wp:comment_author_email/>
    <wp:comment_author_url>{url}</wp:comment_author_url>
    <wp:comment_author_IP/>
    <wp:comment_date>{date}</wp:comment_date>
    <wp:comment_date_gmt>{date}</wp:comment_date_gmt>
    <wp:comment_content>{body}</wp:comment_content>
    <wp:comment_approved>1</wp:comment_approved>
    <wp:comment_type/>
    <wp:comment_parent>0</wp:comment_parent>
    <wp:comment_user_id>0</wp:comment_user_id>
  </wp:comment>"#,
        id = comment.id,
        author = cdata(comment.author_name),
        url = escape_text(comment.author_url),
        date = date,
        body = cdata(comment.body),
    )
}

/// Everything the `<item>` element of one post needs, pre-assembled.
///
/// The `*_xml` fields are already-rendered fragment sequences (taxonomy
/// categories, postmeta, comments); everything else is escaped here.
#[derive(Debug)]
pub struct PostItem<'a> {
    pub id: u64,
    pub title: &'a str,
    pub link: &'a str,
    pub slug: &'a str,
    pub status: &'a str,
    pub post_type: &'a str,
    pub content: &'a str,
    pub taken: NaiveDateTime,
    pub taxonomy_xml: &'a str,
    pub postmeta_xml: &'a str,
    pub comments_xml: &'a str,
}

pub fn post_item_fragment(item: &PostItem) -> String {
    format!(
        r#"<item>
	<title>{title}</title>
	<link>{link}</link>
	<description></description>
	<guid isPermaLink="false">{guid}</guid>
	<pubDate>{pub_date}</pubDate>
	<dc:creator><![CDATA[admin]]></dc:creator>
	<excerpt:encoded><![CDATA[]]></excerpt:encoded>
	<content:encoded>{content}</content:encoded>
	<wp:post_name>{slug}</wp:post_name>
	<wp:post_id>{id}</wp:post_id>
	<wp:post_date_gmt>{date_gmt}</wp:post_date_gmt>
	<wp:post_parent>0</wp:post_parent>
	{taxonomy}
	<wp:post_type>{post_type}</wp:post_type>
	<wp:is_sticky>0</wp:is_sticky>
	{postmeta}
	<wp:ping_status><![CDATA[closed]]></wp:ping_status>
	<wp:post_date>{date}</wp:post_date>
	<wp:comment_status><![CDATA[open]]></wp:comment_status>
	<wp:menu_order>0</wp:menu_order>
	<wp:status>{status}</wp:status>
	{comments}
</item>
"#,
        title = escape_text(item.title),
        link = escape_text(item.link),
        guid = escape_text(item.link),
        pub_date = rfc2822_utc(item.taken),
        content = cdata(item.content),
        slug = escape_text(item.slug),
        id = item.id,
        date_gmt = mysql_datetime(item.taken),
        taxonomy = item.taxonomy_xml,
        post_type = cdata(item.post_type),
        postmeta = item.postmeta_xml,
        date = mysql_datetime(item.taken),
        status = cdata(item.status),
        comments = item.comments_xml,
    )
}

/// Renders one media-library `<item>`. The attachment slug appends the
/// attachment ID to the filename stem because distinct source URLs can
/// share a filename and publish date.
pub fn attachment_item_fragment(record: &AttachmentRecord, origin: &str) -> String {
    let file_slug = slugify(&format!(
        "{}-{}",
        filename_stem(&record.filename),
        record.id
    ));

    let mut postmeta = String::new();
    postmeta.push_str(&postmeta_fragment("_original_import_url", &record.source_url));
    postmeta.push_str(&postmeta_fragment(
        "_original_post_id",
        &record.id.to_string(),
    ));
    if !origin.is_empty() {
        postmeta.push_str(&postmeta_fragment("_original_import_origin", origin));
    }

    let title = record.title.as_deref().unwrap_or(&file_slug);
    let excerpt = record.excerpt.as_deref().unwrap_or_default();

    format!(
        r#"<item>
		<title>{title}</title>
		<link>{link}</link>
		<description></description>
		<guid isPermaLink="false">{guid}</guid>
		<pubDate>{pub_date}</pubDate>
		<dc:creator><![CDATA[admin]]></dc:creator>
		<content:encoded><![CDATA[]]></content:encoded>
		<content:excerpt>{excerpt}</content:excerpt>
		<wp:is_sticky>0</wp:is_sticky>
		<wp:post_type>attachment</wp:post_type>
		<wp:post_parent>{parent}</wp:post_parent>
		<wp:post_date_gmt>{date}</wp:post_date_gmt>
		<wp:post_name>{slug}</wp:post_name>
		<wp:post_id>{id}</wp:post_id>
		<wp:status><![CDATA[publish]]></wp:status>
		<wp:attachment_url>{url}</wp:attachment_url>
		{postmeta}
		<wp:comment_status><![CDATA[closed]]></wp:comment_status>
		<wp:menu_order>0</wp:menu_order>
		<wp:post_date>{date}</wp:post_date>
		<wp:ping_status><![CDATA[closed]]></wp:ping_status>
	</item>
	"#,
        title = escape_text(title),
        link = escape_text(&record.source_url),
        guid = escape_text(&record.source_url),
        pub_date = rfc2822_utc(record.publish_date),
        excerpt = cdata(excerpt),
        parent = record.parent_post_id,
        date = mysql_datetime(record.publish_date),
        slug = escape_text(&file_slug),
        id = record.id,
        url = escape_text(&record.source_url),
        postmeta = postmeta,
    )
}

/// `2019-01-29 10:35:00`, the format WordPress expects for post and
/// comment dates. Export timestamps are treated as UTC throughout, so
/// the local and GMT variants of each date field are identical.
fn mysql_datetime(date: NaiveDateTime) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// RFC 2822 for `pubDate`.
fn rfc2822_utc(date: NaiveDateTime) -> String {
    date.and_utc().to_rfc2822()
}

/// Strips a 3-or-4 character extension; anything else is left alone.
fn filename_stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (3..=4).contains(&ext.len())
                && !ext.contains(char::is_whitespace) =>
        {
            stem
        }
        _ => filename,
    }
}

fn ucfirst(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
