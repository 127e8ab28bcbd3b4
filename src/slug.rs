/// Crude WordPress-style slug from arbitrary text.
///
/// Lowercases, collapses whitespace runs to a single hyphen, drops every
/// character outside `[a-z0-9_-]` (removed, not replaced, so previously
/// separate words can merge), and collapses hyphen runs. No uniqueness
/// guarantee and no length cap.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().to_lowercase().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        match c {
            'a'..='z' | '0'..='9' | '_' => {
                slug.push(c);
                pending_hyphen = false;
            }
            '-' => {
                if !pending_hyphen {
                    slug.push('-');
                }
                pending_hyphen = true;
            }
            _ => {}
        }
    }

    slug
}
