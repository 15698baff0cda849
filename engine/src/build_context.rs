use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const ARTIFACT_FILE_NAME: &str = "Dockerfile";
pub const IMAGE_TAG_PREFIX: &str = "script-container";

const MAX_TAG_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("cannot derive a script name from {}", .path.display())]
    InvalidScriptPath { path: PathBuf },

    #[error("failed to stage {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl StagingError {
    fn io(path: &Path, source: io::Error) -> Self {
        StagingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where one script's build happens.
///
/// Every derived path and the image tag depend only on the script name, so
/// re-running the same script reuses the same directory and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    script_name: String,
    script_path: PathBuf,
    context_root: PathBuf,
}

impl BuildContext {
    pub fn new(
        script_name: impl Into<String>,
        script_path: impl Into<PathBuf>,
        context_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            script_path: script_path.into(),
            context_root: context_root.into(),
        }
    }

    /// The script name is the file name without its extension.
    pub fn from_script_path(
        script_path: &Path,
        context_root: impl Into<PathBuf>,
    ) -> Result<Self, StagingError> {
        let script_name = script_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| StagingError::InvalidScriptPath {
                path: script_path.to_path_buf(),
            })?;
        Ok(Self::new(script_name, script_path, context_root))
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn context_root(&self) -> &Path {
        &self.context_root
    }

    pub fn context_directory(&self) -> PathBuf {
        self.context_root.join(&self.script_name)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.context_directory().join(ARTIFACT_FILE_NAME)
    }

    pub fn script_destination(&self) -> PathBuf {
        let file_name = self
            .script_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&self.script_name));
        self.context_directory().join(file_name)
    }

    /// Container engines only accept lowercase tags drawn from a small
    /// alphabet; anything else in the script name becomes `-`.
    pub fn image_tag(&self) -> String {
        let mut tag: String = self
            .script_name
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                c @ ('a'..='z' | '0'..='9' | '_' | '.' | '-') => c,
                _ => '-',
            })
            .collect();
        let leading = tag.len() - tag.trim_start_matches(['.', '-']).len();
        tag.drain(..leading);
        if tag.is_empty() {
            tag.push_str("script");
        }
        tag.truncate(MAX_TAG_LEN);
        format!("{IMAGE_TAG_PREFIX}:{tag}")
    }
}

/// Create the context directory and copy the script into it. Safe to call
/// repeatedly. Existing entries in the directory are never touched.
pub fn prepare(ctx: &BuildContext) -> Result<(), StagingError> {
    let dir = ctx.context_directory();
    fs::create_dir_all(&dir).map_err(|e| StagingError::io(&dir, e))?;

    let destination = ctx.script_destination();
    if !same_file(ctx.script_path(), &destination) {
        fs::copy(ctx.script_path(), &destination)
            .map_err(|e| StagingError::io(&destination, e))?;
    }
    debug!(
        dir = %dir.display(),
        script = %destination.display(),
        "build context prepared"
    );
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Write `content` as the artifact, preparing the directory first.
pub fn stage_artifact(ctx: &BuildContext, content: &str) -> Result<PathBuf, StagingError> {
    prepare(ctx)?;
    let path = ctx.artifact_path();
    fs::write(&path, content).map_err(|e| StagingError::io(&path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "artifact staged");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context_in(root: &Path, script: &Path) -> BuildContext {
        BuildContext::from_script_path(script, root).unwrap()
    }

    #[test]
    fn paths_derive_from_script_name() {
        let ctx = BuildContext::new("word_counter", "/src/word_counter.py", "build_context");
        assert_eq!(ctx.context_directory(), PathBuf::from("build_context/word_counter"));
        assert_eq!(
            ctx.artifact_path(),
            PathBuf::from("build_context/word_counter/Dockerfile")
        );
        assert_eq!(
            ctx.script_destination(),
            PathBuf::from("build_context/word_counter/word_counter.py")
        );
        assert_eq!(ctx.image_tag(), "script-container:word_counter");
    }

    #[test]
    fn script_name_drops_extension() {
        let ctx = BuildContext::from_script_path(Path::new("/a/b/count_words.py"), "root").unwrap();
        assert_eq!(ctx.script_name(), "count_words");
    }

    #[test]
    fn tag_is_lowercase_and_restricted() {
        let ctx = BuildContext::new("My Script!", "/x/My Script!.sh", "root");
        assert_eq!(ctx.image_tag(), "script-container:my-script-");
        assert_eq!(ctx.context_directory(), PathBuf::from("root/My Script!"));

        let hidden = BuildContext::new("..", "/x/...sh", "root");
        assert_eq!(hidden.image_tag(), "script-container:script");
    }

    #[test]
    fn same_name_same_tag_and_directory() {
        let a = BuildContext::new("tool", "/one/tool.py", "root");
        let b = BuildContext::new("tool", "/two/tool.py", "root");
        assert_eq!(a.image_tag(), b.image_tag());
        assert_eq!(a.context_directory(), b.context_directory());
    }

    #[test]
    fn prepare_is_idempotent_and_copies_script() {
        let src = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let script = src.path().join("tool.py");
        fs::write(&script, "print('hi')").unwrap();
        let ctx = context_in(root.path(), &script);

        prepare(&ctx).unwrap();
        prepare(&ctx).unwrap();

        assert_eq!(
            fs::read_to_string(ctx.script_destination()).unwrap(),
            "print('hi')"
        );
    }

    #[test]
    fn staging_rewrites_artifact_and_keeps_neighbouring_files() {
        // Given: the context directory is the script's own source directory
        let root = TempDir::new().unwrap();
        let project = root.path().join("tool");
        fs::create_dir_all(project.join("lib")).unwrap();
        let script = project.join("tool.py");
        fs::write(&script, "print('hi')").unwrap();
        fs::write(project.join("README.md"), "docs").unwrap();
        fs::write(project.join("lib").join("helper.py"), "x = 1").unwrap();
        let ctx = context_in(root.path(), &script);
        assert_eq!(ctx.context_directory(), project);

        // When
        prepare(&ctx).unwrap();
        stage_artifact(&ctx, "FROM debian").unwrap();
        let path = stage_artifact(&ctx, "FROM ubuntu").unwrap();

        // Then
        assert_eq!(fs::read_to_string(path).unwrap(), "FROM ubuntu");
        assert_eq!(fs::read_to_string(&script).unwrap(), "print('hi')");
        assert_eq!(fs::read_to_string(project.join("README.md")).unwrap(), "docs");
        assert_eq!(
            fs::read_to_string(project.join("lib").join("helper.py")).unwrap(),
            "x = 1"
        );
    }

    #[test]
    fn missing_script_is_an_io_error() {
        let root = TempDir::new().unwrap();
        let ctx = BuildContext::new("ghost", root.path().join("ghost.py"), root.path());
        assert!(matches!(prepare(&ctx), Err(StagingError::Io { .. })));
    }
}
