// 路径工具：远端路径规范化与文件名清洗。
/// Normalize a remote Alist path: leading slash, duplicate slashes
/// collapsed, trailing slash stripped except for the root itself.
pub fn normalize_remote(path: &str) -> String {
    let trimmed = path.trim();
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push('/');
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Join a directory path and a child name, normalizing the result.
pub fn join_remote(parent: &str, name: &str) -> String {
    let base = normalize_remote(parent);
    if base == "/" {
        normalize_remote(&format!("/{name}"))
    } else {
        normalize_remote(&format!("{base}/{name}"))
    }
}

/// Strip characters that are hostile in local file names. Used for
/// user-scoped temp downloads and uploaded file names.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches(['.', ' '].as_ref());
    let mut out: String = cleaned.chars().take(120).collect();
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}
