//! Book structure: provenance detection and canonical ordering of posts.
//!
//! An export is treated as coming from a book system when at least two distinct
//! structural types appear in it. Only then are posts reordered into
//! metadata, front matter, parts with their chapters, back matter, then custom types.

use crate::model::{ParsedPost, PostType};

/// True when posts of two or more distinct structural types are present.
pub fn is_own_format(posts: &[ParsedPost]) -> bool {
    let mut seen: Vec<&PostType> = Vec::with_capacity(2);
    for p in posts {
        if p.post_type.is_structural() && !seen.contains(&&p.post_type) {
            seen.push(&p.post_type);
            if seen.len() >= 2 {
                return true;
            }
        }
    }
    false
}

/// Reorder posts into book order. Types not structural and not in `custom_types` are dropped.
///
/// Chapters are emitted under the part whose id equals their `parent_id`; chapters
/// without such a part are not emitted. Ties keep their source order.
pub fn sort_book_order(posts: &[ParsedPost], custom_types: &[PostType]) -> Vec<ParsedPost> {
    let mut by_order: Vec<&ParsedPost> = posts.iter().collect();
    // Vec::sort_by_key is stable.
    by_order.sort_by_key(|p| p.order);

    let mut out: Vec<ParsedPost> = Vec::with_capacity(posts.len());

    if let Some(meta) = of_type(&by_order, PostType::Metadata).next() {
        out.push(meta.clone());
    }

    out.extend(of_type(&by_order, PostType::FrontMatter).cloned());

    for part in of_type(&by_order, PostType::Part) {
        out.push(part.clone());
        out.extend(
            of_type(&by_order, PostType::Chapter)
                .filter(|c| c.parent_id.as_deref() == Some(part.id.as_str()))
                .cloned(),
        );
    }

    out.extend(of_type(&by_order, PostType::BackMatter).cloned());

    for p in &by_order {
        if !p.post_type.is_structural() && custom_types.contains(&p.post_type) {
            out.push((*p).clone());
        }
    }

    out
}

fn of_type<'a>(
    posts: &'a [&'a ParsedPost],
    t: PostType,
) -> impl Iterator<Item = &'a ParsedPost> + 'a {
    posts.iter().copied().filter(move |p| p.post_type == t)
}
