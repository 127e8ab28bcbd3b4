/// Independent ID counters for each WordPress record namespace.
///
/// Post IDs start at 1. Tag IDs start at 2 because a stock WordPress
/// install reserves term ID 1 for "Uncategorized". Comment IDs are one
/// global sequence shared across every post. Attachment IDs start from
/// an offset computed far above any plausible post ID, so posts and
/// attachments can be imported into the same site without collisions.
///
/// Allocation is never rolled back; callers that decide to discard a
/// record after allocating simply leave a gap.
#[derive(Debug)]
pub struct IdAllocator {
    post: u64,
    tag: u64,
    comment: u64,
    attachment: u64,
}

impl IdAllocator {
    /// `expected_photo_count` sizes the attachment offset:
    /// `1 + round(count + 500, nearest 1000)`, which leaves headroom even
    /// when the run turns out slightly larger than the metadata scan
    /// suggested.
    pub fn new(expected_photo_count: u64) -> Self {
        Self {
            post: 1,
            tag: 2,
            comment: 1,
            attachment: 1 + round_to_nearest_1000(expected_photo_count + 500),
        }
    }

    /// The ID the next `next_post` call will return, without consuming
    /// it. The builder needs this as the attachment parent before the
    /// post itself is finalized.
    pub fn peek_post(&self) -> u64 {
        self.post
    }

    pub fn next_post(&mut self) -> u64 {
        bump(&mut self.post)
    }

    pub fn next_tag(&mut self) -> u64 {
        bump(&mut self.tag)
    }

    pub fn next_comment(&mut self) -> u64 {
        bump(&mut self.comment)
    }

    pub fn next_attachment(&mut self) -> u64 {
        bump(&mut self.attachment)
    }

    pub fn tags_allocated(&self) -> u64 {
        self.tag - 2
    }

    pub fn comments_allocated(&self) -> u64 {
        self.comment - 1
    }
}

fn bump(counter: &mut u64) -> u64 {
    let id = *counter;
    *counter += 1;
    id
}

fn round_to_nearest_1000(n: u64) -> u64 {
    ((n + 500) / 1000) * 1000
}
