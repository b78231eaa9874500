//! SSH command-line grammar (spec.md §4.7): `<git-verb> <quoted-path>`.
//! Generalizes the teacher's plain-string `parse_ssh_command` to also strip
//! quoting and resolve the repository Id, since the raw exec payload here
//! comes from an SSH channel rather than an already-split argv.

use uuid::Uuid;

use crate::errors::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitVerb {
    UploadPack,
    ReceivePack,
}

impl GitVerb {
    pub fn as_git_subcommand(&self) -> &'static str {
        match self {
            GitVerb::UploadPack => "upload-pack",
            GitVerb::ReceivePack => "receive-pack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub verb: GitVerb,
    pub repository_id: Uuid,
}

/// Parse a raw SSH exec payload of the form `git-upload-pack '<id>.git'` (or
/// `git-receive-pack "<id>.git"`, or unquoted). Any other verb is rejected.
pub fn parse_git_command(raw: &str) -> Result<ParsedCommand, RegistryError> {
    let mut parts = raw.trim().splitn(2, char::is_whitespace);
    let verb = parts
        .next()
        .ok_or_else(|| RegistryError::invalid_argument("empty ssh command"))?;
    let verb = match verb {
        "git-upload-pack" => GitVerb::UploadPack,
        "git-receive-pack" => GitVerb::ReceivePack,
        other => {
            return Err(RegistryError::invalid_argument(format!(
                "unsupported git ssh verb: {other}"
            )));
        }
    };

    let raw_path = parts
        .next()
        .ok_or_else(|| RegistryError::invalid_argument("missing repository path"))?
        .trim();
    let repository_id = resolve_repository_id(raw_path)?;

    Ok(ParsedCommand { verb, repository_id })
}

/// Strip surrounding quotes and a leading `/`, drop a trailing `.git`, and
/// take the last path segment as the repository Id (spec.md §4.7: "the URL
/// the client pushes is `git@host:<Id>.git`").
fn resolve_repository_id(raw_path: &str) -> Result<Uuid, RegistryError> {
    let unquoted = raw_path
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| raw_path.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(raw_path);

    let stripped = unquoted.strip_prefix('/').unwrap_or(unquoted);
    let stripped = stripped.strip_suffix(".git").unwrap_or(stripped);

    let last_segment = stripped
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RegistryError::invalid_argument("empty repository path"))?;

    Uuid::parse_str(last_segment)
        .map_err(|_| RegistryError::invalid_argument(format!("not a repository id: {last_segment}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_upload_pack() {
        let id = Uuid::new_v4();
        let raw = format!("git-upload-pack '{id}.git'");
        let parsed = parse_git_command(&raw).unwrap();
        assert_eq!(parsed.verb, GitVerb::UploadPack);
        assert_eq!(parsed.repository_id, id);
    }

    #[test]
    fn parses_unquoted_receive_pack_without_leading_slash() {
        let id = Uuid::new_v4();
        let raw = format!("git-receive-pack {id}.git");
        let parsed = parse_git_command(&raw).unwrap();
        assert_eq!(parsed.verb, GitVerb::ReceivePack);
        assert_eq!(parsed.repository_id, id);
    }

    #[test]
    fn rejects_unknown_verb() {
        let id = Uuid::new_v4();
        let raw = format!("git-upload-archive '{id}.git'");
        assert!(parse_git_command(&raw).is_err());
    }

    #[test]
    fn rejects_non_uuid_path() {
        assert!(parse_git_command("git-upload-pack 'not-a-uuid.git'").is_err());
    }
}
