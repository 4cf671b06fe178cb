//! Line-preserving Java-properties documents
//!
//! Jetty's `start.d/*.ini` files are properties files. Rewrites keep every
//! comment, blank line and untouched entry exactly as it was on disk; only
//! entries whose value changes are re-rendered.

use crate::ConfigError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Character encoding a document was read with, and will be written back in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1; characters outside Latin-1 are written as `\uXXXX`
    Latin1,
}

/// A logical line and the terminator that ended it on disk (`""` at EOF)
#[derive(Debug, Clone)]
enum Line {
    /// Comment or blank line, kept byte-for-byte
    Verbatim { text: String, eol: &'static str },
    Entry {
        key: String,
        value: String,
        /// Original text while the entry is untouched
        raw: Option<String>,
        eol: &'static str,
    },
}

impl Line {
    fn eol_mut(&mut self) -> &mut &'static str {
        match self {
            Self::Verbatim { eol, .. } | Self::Entry { eol, .. } => eol,
        }
    }
}

/// A parsed properties document
#[derive(Debug, Clone)]
pub struct Properties {
    lines: Vec<Line>,
    encoding: Encoding,
    /// Terminator for appended entries: the first one seen in the file
    newline: &'static str,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            encoding: Encoding::Utf8,
            newline: "\n",
        }
    }
}

impl Properties {
    /// Parse raw file contents
    pub fn parse(bytes: &[u8]) -> Self {
        let (text, encoding) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), Encoding::Utf8),
            Err(_) => (bytes.iter().map(|&b| char::from(b)).collect(), Encoding::Latin1),
        };

        let physical: Vec<(&str, &'static str)> =
            text.split_inclusive('\n').map(split_eol).collect();
        let newline = physical
            .iter()
            .map(|&(_, eol)| eol)
            .find(|eol| !eol.is_empty())
            .unwrap_or("\n");

        let mut lines = Vec::new();
        let mut iter = physical.into_iter();
        while let Some((first, mut eol)) = iter.next() {
            let trimmed = first.trim_start_matches(is_blank);
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                lines.push(Line::Verbatim {
                    text: first.to_string(),
                    eol,
                });
                continue;
            }

            let mut raw = first.to_string();
            let mut logical = trimmed.to_string();
            while ends_with_continuation(&logical) {
                logical.pop();
                match iter.next() {
                    Some((next, next_eol)) => {
                        raw.push_str(eol);
                        raw.push_str(next);
                        logical.push_str(next.trim_start_matches(is_blank));
                        eol = next_eol;
                    }
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical);
            lines.push(Line::Entry {
                key,
                value,
                raw: Some(raw),
                eol,
            });
        }

        Self {
            lines,
            encoding,
            newline,
        }
    }

    /// Read and parse the file at `path`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&bytes))
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Effective value of `key`; the last occurrence wins, as in Java
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Effective key/value mapping
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for line in &self.lines {
            if let Line::Entry { key, value, .. } = line {
                map.insert(key.clone(), value.clone());
            }
        }
        map
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.to_map().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.lines.iter().any(|l| matches!(l, Line::Entry { .. }))
    }

    /// Set `key` to `value`
    ///
    /// The effective entry is updated in place; an absent key is appended.
    /// Returns false when the key already had exactly this value.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let existing = self.lines.iter_mut().rev().find_map(|line| match line {
            Line::Entry {
                key: k, value, raw, ..
            } if k == key => Some((value, raw)),
            _ => None,
        });

        match existing {
            Some((current, _)) if current == value => false,
            Some((current, raw)) => {
                *current = value.to_string();
                *raw = None;
                true
            }
            None => {
                let newline = self.newline;
                if let Some(last) = self.lines.last_mut() {
                    let eol = last.eol_mut();
                    if eol.is_empty() {
                        *eol = newline;
                    }
                }
                self.lines.push(Line::Entry {
                    key: key.to_string(),
                    value: value.to_string(),
                    raw: None,
                    eol: newline,
                });
                true
            }
        }
    }

    /// Apply every update; keys not named are left alone
    pub fn apply<I, K, V>(&mut self, updates: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut changed = 0;
        for (key, value) in updates {
            if self.set(key.as_ref(), value.as_ref()) {
                changed += 1;
            }
        }
        changed
    }

    /// Render the document in its original encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim { text: raw, eol }
                | Line::Entry {
                    raw: Some(raw), eol, ..
                } => {
                    text.push_str(raw);
                    text.push_str(eol);
                }
                Line::Entry {
                    key,
                    value,
                    raw: None,
                    eol,
                } => {
                    text.push_str(&escape(key, true));
                    text.push('=');
                    text.push_str(&escape(value, false));
                    text.push_str(eol);
                }
            }
        }

        match self.encoding {
            Encoding::Utf8 => text.into_bytes(),
            Encoding::Latin1 => encode_latin1(&text),
        }
    }

    /// Write the document to `path` through a temporary file and a rename
    ///
    /// The original file's permissions are carried over. On failure the
    /// original file is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Write`] when any step of the write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&self.to_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(tmp.path(), meta.permissions()).map_err(write_err)?;
        }

        tmp.persist(path).map_err(|e| write_err(e.error))?;
        debug!(path = %path.display(), "Properties file written");
        Ok(())
    }
}

/// Load `path`, apply `updates` and write it back atomically
///
/// Returns the number of keys whose value changed.
///
/// # Errors
///
/// [`ConfigError::Read`] if the file cannot be loaded (nothing is written),
/// [`ConfigError::Write`] if the new contents cannot be persisted.
pub fn rewrite<P, I, K, V>(path: P, updates: I) -> Result<usize, ConfigError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let path = path.as_ref();
    let mut props = Properties::load(path)?;
    let changed = props.apply(updates);
    props.save(path)?;
    Ok(changed)
}

/// Split a physical line from `split_inclusive` into text and terminator
fn split_eol(line: &str) -> (&str, &'static str) {
    if let Some(text) = line.strip_suffix("\r\n") {
        (text, "\r\n")
    } else if let Some(text) = line.strip_suffix('\n') {
        (text, "\n")
    } else {
        (line, "")
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// Split a logical line into unescaped key and value
fn split_entry(line: &str) -> (String, String) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || is_blank(c) {
            break;
        }
        i += 1;
    }
    let key: String = chars[..i].iter().collect();

    let mut j = i;
    while j < chars.len() && is_blank(chars[j]) {
        j += 1;
    }
    if j < chars.len() && (chars[j] == '=' || chars[j] == ':') {
        j += 1;
        while j < chars.len() && is_blank(chars[j]) {
            j += 1;
        }
    }
    let value: String = chars[j..].iter().collect();

    (unescape(&key), unescape(&value))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 4) {
                    Some(code) => {
                        for _ in 0..4 {
                            chars.next();
                        }
                        push_utf16_unit(&mut out, &mut chars, code);
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Push a `\uXXXX` code unit, pairing surrogates when the next escape completes one
fn push_utf16_unit(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    unit: u32,
) {
    if (0xD800..0xDC00).contains(&unit) {
        let lookahead: String = chars.clone().take(6).collect();
        if let Some(low) = lookahead
            .strip_prefix("\\u")
            .and_then(|h| u32::from_str_radix(h, 16).ok())
            .filter(|l| (0xDC00..0xE000).contains(l))
        {
            for _ in 0..6 {
                chars.next();
            }
            let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            out.extend(char::from_u32(code));
            return;
        }
    }
    out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (idx, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            ' ' if is_key || idx == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn encode_latin1(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => out.push(b),
            Err(_) => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.extend_from_slice(format!("\\u{:04X}", unit).as_bytes());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_separators() {
        let props = Properties::parse(b"a=1\nb : 2\nc 3\nd\n  e=  spaced value\n");
        assert_eq!(props.get("a"), Some("1"));
        assert_eq!(props.get("b"), Some("2"));
        assert_eq!(props.get("c"), Some("3"));
        assert_eq!(props.get("d"), Some(""));
        assert_eq!(props.get("e"), Some("spaced value"));
        assert_eq!(props.len(), 5);
    }

    #[test]
    fn test_parse_skips_comments() {
        let props = Properties::parse(b"# a=1\n! b=2\n\n   \nc=3\n");
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("a"), None);
        assert_eq!(props.get("c"), Some("3"));
    }

    #[test]
    fn test_parse_jetty_module_lines() {
        let props = Properties::parse(b"--module=ssl\njetty.ssl.port=8443\n");
        assert_eq!(props.get("--module"), Some("ssl"));
        assert_eq!(props.get("jetty.ssl.port"), Some("8443"));
    }

    #[test]
    fn test_parse_escapes_and_continuations() {
        let text = "path=C:\\\\certs\\\\store\nlist=one, \\\n    two\nkey\\=with\\:seps=v\nuni=caf\\u00e9\n";
        let props = Properties::parse(text.as_bytes());
        assert_eq!(props.get("path"), Some("C:\\certs\\store"));
        assert_eq!(props.get("list"), Some("one, two"));
        assert_eq!(props.get("key=with:seps"), Some("v"));
        assert_eq!(props.get("uni"), Some("café"));
    }

    #[test]
    fn test_last_duplicate_wins() {
        let mut props = Properties::parse(b"a=1\na=2\n");
        assert_eq!(props.get("a"), Some("2"));

        props.set("a", "3");
        assert_eq!(
            String::from_utf8(props.to_bytes()).unwrap(),
            "a=1\na=3\n"
        );
    }

    #[test]
    fn test_untouched_document_round_trips() {
        let text = "# Jetty SSL\r\n--module=ssl\r\n\r\njetty.ssl.port = 8443\r\nx=a \\\r\n  b\r\n";
        let props = Properties::parse(text.as_bytes());
        assert_eq!(props.to_bytes(), text.as_bytes());
    }

    #[test]
    fn test_mixed_line_endings_preserved() {
        let mut props = Properties::parse(b"a=1\r\nb=2\nc=3\r\n");
        props.set("a", "9");
        assert_eq!(props.to_bytes(), b"a=9\r\nb=2\nc=3\r\n");

        // Appended entries take the first terminator seen
        props.set("d", "4");
        assert_eq!(props.to_bytes(), b"a=9\r\nb=2\nc=3\r\nd=4\r\n");
    }

    #[test]
    fn test_continuation_keeps_inner_line_endings() {
        let text = "x=a \\\n  b\r\ny=2\r\n";
        let mut props = Properties::parse(text.as_bytes());
        assert_eq!(props.get("x"), Some("a b"));

        props.set("y", "3");
        assert_eq!(props.to_bytes(), b"x=a \\\n  b\r\ny=3\r\n");
    }

    #[test]
    fn test_missing_trailing_newline_preserved() {
        let props = Properties::parse(b"a=1\nb=2");
        assert_eq!(props.to_bytes(), b"a=1\nb=2");
    }

    #[test]
    fn test_set_preserves_unrelated_keys() {
        let mut props = Properties::parse(b"a=1\nkeystorePath=old\nother=x\n");
        props.apply([("keystorePath", "new")]);

        let map = props.to_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map["a"], "1");
        assert_eq!(map["keystorePath"], "new");
        assert_eq!(map["other"], "x");
        assert_eq!(
            String::from_utf8(props.to_bytes()).unwrap(),
            "a=1\nkeystorePath=new\nother=x\n"
        );
    }

    #[test]
    fn test_set_appends_missing_key() {
        let mut props = Properties::parse(b"# header\na=1");
        assert!(props.set("b", "2"));
        assert_eq!(
            String::from_utf8(props.to_bytes()).unwrap(),
            "# header\na=1\nb=2\n"
        );
    }

    #[test]
    fn test_set_same_value_keeps_original_text() {
        let mut props = Properties::parse(b"a : 1\n");
        assert!(!props.set("a", "1"));
        assert_eq!(props.to_bytes(), b"a : 1\n");
    }

    #[test]
    fn test_set_on_empty_document() {
        let mut props = Properties::parse(b"");
        assert!(props.is_empty());
        props.set("jetty.keystore", "/etc/keystore");
        assert_eq!(props.to_bytes(), b"jetty.keystore=/etc/keystore\n");
    }

    #[test]
    fn test_escaped_values_read_back() {
        let mut props = Properties::default();
        props.set("odd key", " pass\\word\n#!");
        let reparsed = Properties::parse(&props.to_bytes());
        assert_eq!(reparsed.get("odd key"), Some(" pass\\word\n#!"));
    }

    #[test]
    fn test_latin1_document_stays_latin1() {
        let mut props = Properties::parse(b"# caf\xe9\nname=M\xfcller\n");
        assert_eq!(props.encoding(), Encoding::Latin1);
        assert_eq!(props.get("name"), Some("Müller"));

        props.set("pw", "€uro");
        assert_eq!(
            props.to_bytes(),
            b"# caf\xe9\nname=M\xfcller\npw=\\u20ACuro\n".to_vec()
        );
    }

    #[test]
    fn test_rewrite_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ssl.ini");
        fs::write(&path, "# keep me\na=1\nkeystorePath=old\nother=x\n").unwrap();

        let changed = rewrite(&path, [("keystorePath", "new")]).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# keep me\na=1\nkeystorePath=new\nother=x\n"
        );

        // No stray temp files next to the target
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_rewrite_missing_file_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ssl.ini");

        let result = rewrite(&path, [("a", "1")]);
        assert!(matches!(result, Err(ConfigError::Read { .. })));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_failure_leaves_target_and_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("ssl.ini");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"inside").unwrap();

        let props = Properties::parse(b"a=1\n");
        let result = props.save(&target);

        assert!(matches!(result, Err(ConfigError::Write { ref path, .. }) if path == &target));
        assert!(target.is_dir());
        assert_eq!(fs::read(target.join("keep")).unwrap(), b"inside");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_in_read_only_dir_keeps_original() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("start.d");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("ssl.ini");
        fs::write(&path, "# keep\na=1\n").unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions
        if fs::write(dir.join("write-check"), b"").is_ok() {
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = rewrite(&path, [("a", "2")]);
        let entries = fs::read_dir(&dir).unwrap().count();
        let contents = fs::read_to_string(&path).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(ConfigError::Write { .. })));
        assert_eq!(contents, "# keep\na=1\n");
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ssl.ini");
        fs::write(&path, "a=1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        rewrite(&path, [("a", "2")]).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
