//! Regeneration pipeline.
//!
//! Reads every fragment in the input directory, runs each one through
//! parse → port policy → render, and writes the concatenated result to the
//! output file in a single step.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use log::{debug, info};

use crate::config::GeneratorConfig;
use crate::errors::{GeneratorError, ParseError};
use crate::filter::apply_port_policy;
use crate::parser::parse;
use crate::render::render_block;

/// Suffix marking a file in the input directory as a server fragment.
pub const SERVER_FILE_SUFFIX: &str = ".server";

/// Name of the generated file inside the output directory.
pub const OUTPUT_FILE_NAME: &str = "custom-server-block.server";

/// A fragment read from the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub content: Vec<u8>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Outcome of a successful regeneration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    /// Fragments that were read.
    pub fragments: usize,
    /// Server blocks written to the output.
    pub blocks: usize,
    /// Size of the output in bytes.
    pub bytes: usize,
    /// Path of the written file.
    pub output_path: PathBuf,
}

/// Whether `name` designates a server fragment.
pub fn is_server_file(name: &str) -> bool {
    name.ends_with(SERVER_FILE_SUFFIX)
}

/// Transform one fragment and append its rendered blocks to `out`.
///
/// Returns the number of blocks that survived the port policy.
pub fn build_server_config(fragment: &Fragment, bind_statement: &str, out: &mut String) -> Result<usize, ParseError> {
    let blocks = parse(&fragment.name, &fragment.content)?;

    let mut retained = 0;
    for block in blocks.into_iter().filter_map(apply_port_policy) {
        render_block(&block, bind_statement, out);
        retained += 1;
    }
    debug!("Fragment {} contributed {} server block(s)", fragment.name, retained);
    Ok(retained)
}

/// Transform all `fragments` in order, returning the text and the retained block count.
///
/// The first fragment that fails to parse aborts the whole build.
pub fn build_config_counted(fragments: &[Fragment], bind_statement: &str) -> Result<(String, usize), ParseError> {
    let mut out = String::new();
    let mut blocks = 0;
    for fragment in fragments {
        blocks += build_server_config(fragment, bind_statement, &mut out)?;
    }
    Ok((out, blocks))
}

/// Transform all `fragments` in order into one configuration text.
pub fn build_config(fragments: &[Fragment], bind_statement: &str) -> Result<String, ParseError> {
    build_config_counted(fragments, bind_statement).map(|(out, _)| out)
}

/// Read all server fragments of `input_dir`, sorted by file name.
pub fn read_fragments(input_dir: &Path) -> Result<Vec<Fragment>, GeneratorError> {
    let dir_err = |source| GeneratorError::DirectoryRead {
        path: input_dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(input_dir).map_err(dir_err)? {
        let entry = entry.map_err(dir_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_server_file(&name) {
            debug!("Skipping {} in input directory", name);
            continue;
        }
        // Follows symlinks, mounted config maps link their files
        let path = entry.path();
        if !path.is_file() {
            debug!("Skipping {} as it is not a regular file", name);
            continue;
        }
        names.push(name);
    }
    names.sort();

    names
        .into_iter()
        .map(|name| {
            let content = fs::read(input_dir.join(&name))
                .map_err(|source| GeneratorError::FragmentRead { name: name.clone(), source })?;
            Ok(Fragment { name, content })
        })
        .collect()
}

/// Replace the output file in `output_dir` with `contents`.
///
/// The data goes to a temporary sibling first, which is then renamed over
/// the target so readers never observe a partially written file.
pub fn write_output(output_dir: &Path, contents: &str) -> Result<PathBuf, GeneratorError> {
    let output_path = output_dir.join(OUTPUT_FILE_NAME);
    let tmp_path = output_dir.join(format!(".{OUTPUT_FILE_NAME}.tmp"));
    let write_err = |source| GeneratorError::Write {
        path: output_path.clone(),
        source,
    };

    let result = write_file(&tmp_path, contents.as_bytes()).and_then(|_| fs::rename(&tmp_path, &output_path));
    if let Err(source) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(source));
    }
    Ok(output_path)
}

fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn check_dir(path: &Path) -> Result<(), GeneratorError> {
    let metadata = fs::metadata(path).map_err(|source| GeneratorError::DirectoryRead {
        path: path.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(GeneratorError::DirectoryRead {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "not a directory"),
        });
    }
    Ok(())
}

/// Run one full regeneration pass.
///
/// The new configuration is assembled completely in memory; on any error the
/// existing output file is left untouched.
pub fn regenerate(config: &GeneratorConfig) -> Result<PassSummary, GeneratorError> {
    check_dir(&config.input_dir)?;
    check_dir(&config.output_dir)?;

    let fragments = read_fragments(&config.input_dir)?;

    let (out, blocks) = build_config_counted(&fragments, &config.bind_statement)?;

    info!("Writing configuration to {}", config.output_dir.join(OUTPUT_FILE_NAME).display());
    let output_path = write_output(&config.output_dir, &out)?;

    Ok(PassSummary {
        fragments: fragments.len(),
        blocks,
        bytes: out.len(),
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIND: &str = "bind 1.2.3.4";

    #[test]
    fn single_block_end_to_end() {
        let fragment = Fragment::new("a.server", "example.org:8053 { log }");
        let out = build_config(&[fragment], BIND).unwrap();
        assert_eq!(out, "example.org:53 {\n    bind 1.2.3.4\n    log\n}\n\n");
    }

    #[test]
    fn byte_order_mark_does_not_reach_output() {
        let fragment = Fragment::new("a.server", "\u{feff}example.org:8053 { log }");
        let out = build_config(&[fragment], BIND).unwrap();
        assert!(!out.contains('\u{feff}'));
        assert_eq!(out, "example.org:53 {\n    bind 1.2.3.4\n    log\n}\n\n");
    }

    #[test]
    fn invalid_port_block_is_absent() {
        let fragment = Fragment::new("a.server", "foo:9999 {\n    log\n}\nbar:53 {\n    errors\n}\n");
        let out = build_config(&[fragment], BIND).unwrap();
        assert_eq!(out, "bar:53 {\n    bind 1.2.3.4\n    errors\n}\n\n");
        assert!(!out.contains("foo"));
    }

    #[test]
    fn fragments_are_concatenated_in_order() {
        let fragments = vec![
            Fragment::new("b.server", "b:8053 {\n    log\n}\n"),
            Fragment::new("a.server", "a:53 {\n    errors\n}\n"),
        ];
        let out = build_config(&fragments, BIND).unwrap();
        assert_eq!(
            out,
            "b:53 {\n    bind 1.2.3.4\n    log\n}\n\na:53 {\n    bind 1.2.3.4\n    errors\n}\n\n"
        );
    }

    #[test]
    fn first_parse_error_aborts() {
        let fragments = vec![
            Fragment::new("good.server", "a:53 {\n    log\n}\n"),
            Fragment::new("bad.server", "b:53 {\n    log\n"),
        ];
        let err = build_config(&fragments, BIND).unwrap_err();
        assert_eq!(err.file, "bad.server");
    }

    #[test]
    fn build_server_config_counts_retained_blocks() {
        let fragment = Fragment::new("a.server", "a:53 {\n}\nb:1 {\n}\nc:8053 {\n}\n");
        let mut out = String::new();
        assert_eq!(build_server_config(&fragment, BIND, &mut out).unwrap(), 2);
    }

    #[test]
    fn counted_build_fails_fast_and_counts() {
        let fragments = vec![
            Fragment::new("a.server", "a:53 {\n}\nx:1 {\n}\n"),
            Fragment::new("b.server", "b:8053 {\n}\n"),
        ];
        let (out, blocks) = build_config_counted(&fragments, BIND).unwrap();
        assert_eq!(blocks, 2);
        assert_eq!(out, build_config(&fragments, BIND).unwrap());

        let broken = vec![fragments[0].clone(), Fragment::new("c.server", "c:53 {\n")];
        assert_eq!(build_config_counted(&broken, BIND).unwrap_err().file, "c.server");
    }

    #[test]
    fn no_fragments_build_empty_output() {
        assert_eq!(build_config(&[], BIND).unwrap(), "");
    }

    #[test]
    fn server_file_suffix() {
        assert!(is_server_file("zone.server"));
        assert!(!is_server_file("zone.server.bak"));
        assert!(!is_server_file("Corefile"));
    }

    #[test]
    fn read_fragments_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.server"), "b:53 {\n}\n").unwrap();
        fs::write(dir.path().join("a.server"), "a:53 {\n}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("dir.server")).unwrap();

        let fragments = read_fragments(dir.path()).unwrap();
        let names: Vec<&str> = fragments.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.server", "b.server"]);
        assert_eq!(fragments[0].content, b"a:53 {\n}\n");
    }

    #[test]
    fn read_fragments_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = read_fragments(&missing).unwrap_err();
        assert!(matches!(err, GeneratorError::DirectoryRead { .. }));
    }

    #[test]
    fn write_output_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(dir.path(), "first").unwrap();
        assert_eq!(path, dir.path().join(OUTPUT_FILE_NAME));
        write_output(dir.path(), "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join(format!(".{OUTPUT_FILE_NAME}.tmp")).exists());
    }

    #[cfg(unix)]
    #[test]
    fn write_output_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(dir.path(), "x").unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
