/// Splits a dotted dataset name into components. Double-quoted components may
/// contain dots; `""` inside quotes is an escaped quote.
pub fn split_dataset_path(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = name.trim().chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            '.' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts.retain(|part| !part.is_empty());
    parts
}

pub fn quote_dataset_path(path: &[String]) -> String {
    path.iter()
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_and_quoted_components() {
        assert_eq!(split_dataset_path("sys.jobs_recent"), vec!["sys", "jobs_recent"]);
        assert_eq!(
            split_dataset_path("\"my.space\".folder.\"t 1\""),
            vec!["my.space", "folder", "t 1"]
        );
    }

    #[test]
    fn escaped_quotes_survive() {
        assert_eq!(split_dataset_path("\"a\"\"b\".c"), vec!["a\"b", "c"]);
    }

    #[test]
    fn quoting_is_inverse_of_split() {
        let path = vec!["my.space".to_string(), "t".to_string()];
        assert_eq!(quote_dataset_path(&path), "\"my.space\".\"t\"");
        assert_eq!(split_dataset_path(&quote_dataset_path(&path)), path);
    }
}
