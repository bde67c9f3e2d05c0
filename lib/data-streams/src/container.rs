//! Container identifier discovery.
//!
//! When the process runs inside a container, the intake can attribute payloads to it via the
//! `Datadog-Container-ID` request header. The identifier is recovered from `/proc/self/cgroup`;
//! any failure simply resolves to "no container" and the header is omitted.

use std::fs;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;

const CGROUP_PATH: &str = "/proc/self/cgroup";

/// Matches one cgroup line, capturing the control-group path.
static CGROUP_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+:[^:]*:(.+)$").expect("static regex must compile"));

/// Matches the container identifier at the end of a control-group path: a 64-hex-digit
/// container id, an ECS task id, or a GC-style UUID, optionally wrapped in a systemd scope.
static CONTAINER_ID_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([0-9a-f]{64}|[0-9a-f]{32}-\d+|[0-9a-f]{8}[-_][0-9a-f]{4}[-_][0-9a-f]{4}[-_][0-9a-f]{4}[-_][0-9a-f]{12})(?:\.scope)?$",
    )
    .expect("static regex must compile")
});

static CONTAINER_ID: OnceLock<Option<String>> = OnceLock::new();

/// Returns the identifier of the container this process runs in, if any.
///
/// The lookup runs once per process; the result is cached, including a negative one.
pub fn container_id() -> Option<&'static str> {
    CONTAINER_ID
        .get_or_init(|| {
            let contents = fs::read_to_string(CGROUP_PATH).ok()?;
            parse_container_id(&contents)
        })
        .as_deref()
}

fn parse_container_id(cgroup_contents: &str) -> Option<String> {
    for line in cgroup_contents.lines() {
        let Some(captures) = CGROUP_LINE.captures(line.trim()) else {
            continue;
        };
        let path = captures.get(1).map(|group_path| group_path.as_str())?;
        if let Some(captures) = CONTAINER_ID_TAIL.captures(path) {
            return captures.get(1).map(|id| id.as_str().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_style() {
        let contents = "12:memory:/docker/0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef\n";
        assert_eq!(
            parse_container_id(contents).as_deref(),
            Some("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"),
        );
    }

    #[test]
    fn test_kubernetes_systemd_scope() {
        let contents = "1:name=systemd:/kubepods/besteffort/pod1234/docker-0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef.scope\n";
        assert_eq!(
            parse_container_id(contents).as_deref(),
            Some("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"),
        );
    }

    #[test]
    fn test_ecs_task_style() {
        let contents = "9:perf_event:/ecs/task-arn/0123456789abcdef0123456789abcdef-1234567\n";
        assert_eq!(
            parse_container_id(contents).as_deref(),
            Some("0123456789abcdef0123456789abcdef-1234567"),
        );
    }

    #[test]
    fn test_uuid_style() {
        let contents = "2:cpu:/garden/01234567-89ab-cdef-0123-456789abcdef\n";
        assert_eq!(
            parse_container_id(contents).as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef"),
        );
    }

    #[test]
    fn test_no_container() {
        assert_eq!(parse_container_id("12:memory:/user.slice\n"), None);
        assert_eq!(parse_container_id(""), None);
        assert_eq!(parse_container_id("not a cgroup line"), None);
    }
}
