use super::{NewBlogPost, NewPaper, NewRepo};

/// A normalized record ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub enum NewRecord {
    Repo(NewRepo),
    Paper(NewPaper),
    Blog(NewBlogPost),
}

impl NewRecord {
    /// The natural unique key the store dedups on.
    pub fn key(&self) -> &str {
        match self {
            NewRecord::Repo(r) => &r.full_name,
            NewRecord::Paper(p) => &p.pdf_url,
            NewRecord::Blog(b) => &b.url,
        }
    }
}

pub fn join_list<S: AsRef<str>>(items: &[S], sep: &str) -> String {
    items
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

pub fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(split_list("ai-infra, vLLM,,"), vec!["ai-infra", "vLLM"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_join_list_trims() {
        assert_eq!(join_list(&[" A", "B ", ""], ", "), "A, B");
    }
}
