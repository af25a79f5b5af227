use std::fmt;
use super::structs::{truncate_chars, ArticleRef};

/// 提示词里每篇文章的摘录长度
pub const EXCERPT_CHARS: usize = 300;

impl fmt::Display for ArticleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.source_name.trim().is_empty() { "Unknown" } else { self.source_name.trim() };

        write!(f,
            "Article: {}\n\
            Source: {}\n\
            URL: {}\n\
            Content: {}...\n\
            Sentiment: {}",
            self.title.trim(),
            source,
            self.url.trim(),
            truncate_chars(&self.description, EXCERPT_CHARS),
            self.bias_type.as_str()
        )
    }
}
