//! Naming conventions used for relation defaults.
//!
//! `Galleries` → singular `gallery`, plural snake `galleries`.
//! Foreign keys are `<singular>_id`; join models are the two plural snake
//! names sorted and joined with `_` (`images_tags`).

pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}

pub(crate) fn singular(name: &str) -> String {
    let snake = snake_case(name);

    if let Some(stem) = snake.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if snake.ends_with(suffix) {
            return snake[..snake.len() - 2].to_string();
        }
    }
    match snake.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') && !stem.is_empty() => stem.to_string(),
        _ => snake,
    }
}

pub(crate) fn foreign_key(model: &str) -> String {
    format!("{}_id", singular(model))
}

pub(crate) fn join_model(left: &str, right: &str) -> String {
    let mut names = [snake_case(left), snake_case(right)];
    names.sort();

    names.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventions_match_the_gallery_schema() {
        assert_eq!(singular("Galleries"), "gallery");
        assert_eq!(singular("Images"), "image");
        assert_eq!(singular("Boxes"), "box");
        assert_eq!(singular("Address"), "address");
        assert_eq!(foreign_key("Galleries"), "gallery_id");
        assert_eq!(join_model("Tags", "Images"), "images_tags");
        assert_eq!(join_model("BlogPosts", "Tags"), "blog_posts_tags");
    }
}
