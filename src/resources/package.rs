//! Package resource handler (apt).

use super::shell_quote;
use crate::core::types::Resource;

/// Shell test that succeeds when `$pkg` is fully installed.
const INSTALLED_TEST: &str =
    "dpkg -s \"$pkg\" 2>/dev/null | grep -q '^Status: install ok installed'";

fn quoted_list(resource: &Resource) -> String {
    resource
        .packages
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generate shell script to check if packages are installed.
///
/// Prints one `installed:<pkg>` or `missing:<pkg>` line per package.
pub fn check_script(resource: &Resource) -> String {
    let joined = quoted_list(resource);
    format!(
        "for pkg in {joined}; do\n\
           if {INSTALLED_TEST}; then echo \"installed:$pkg\"; else echo \"missing:$pkg\"; fi\n\
         done"
    )
}

/// Generate shell script to install or remove packages.
pub fn apply_script(resource: &Resource) -> String {
    let joined = quoted_list(resource);

    if resource.is_removal() {
        return format!(
            "set -euo pipefail\n\
             REMOVE=\"\"\n\
             for pkg in {joined}; do\n\
               if {INSTALLED_TEST}; then REMOVE=\"$REMOVE $pkg\"; fi\n\
             done\n\
             if [ -n \"$REMOVE\" ]; then\n\
               DEBIAN_FRONTEND=noninteractive apt-get remove -y -qq $REMOVE\n\
             fi"
        );
    }

    format!(
        "set -euo pipefail\n\
         MISSING=\"\"\n\
         for pkg in {joined}; do\n\
           {INSTALLED_TEST} || MISSING=\"$MISSING $pkg\"\n\
         done\n\
         if [ -n \"$MISSING\" ]; then\n\
           apt-get update -qq\n\
           DEBIAN_FRONTEND=noninteractive apt-get install -y -qq $MISSING\n\
         fi\n\
         for pkg in {joined}; do\n\
           {INSTALLED_TEST} || {{ echo \"package $pkg not installed after apply\" >&2; exit 1; }}\n\
         done"
    )
}

/// Generate shell to query installed versions (for state hashing).
pub fn state_query_script(resource: &Resource) -> String {
    resource
        .packages
        .iter()
        .map(|p| {
            let q = shell_quote(p);
            format!(
                "dpkg-query -W -f '${{Package}}=${{Version}}\\n' {q} 2>/dev/null || echo {}",
                shell_quote(&format!("{}=MISSING", p))
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Packages reported missing by [`check_script`] output.
pub fn missing_from_check(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|l| l.trim().strip_prefix("missing:"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ResourceType;

    fn make_apt_resource(packages: &[&str]) -> Resource {
        let mut r = Resource::new(ResourceType::Package);
        r.provider = Some("apt".to_string());
        r.packages = packages.iter().map(|s| s.to_string()).collect();
        r
    }

    #[test]
    fn test_check_apt() {
        let r = make_apt_resource(&["cron", "curl"]);
        let script = check_script(&r);
        assert!(script.contains("for pkg in 'cron' 'curl'"));
        assert!(script.contains("install ok installed"));
    }

    #[test]
    fn test_apply_apt_present() {
        let r = make_apt_resource(&["cron"]);
        let script = apply_script(&r);
        assert!(script.starts_with("set -euo pipefail"));
        assert!(script.contains("apt-get install -y -qq $MISSING"));
        assert!(script.contains("DEBIAN_FRONTEND=noninteractive"));
        assert!(script.contains("not installed after apply"));
        assert!(!script.contains("apt-get remove"));
    }

    #[test]
    fn test_apply_apt_absent() {
        let mut r = make_apt_resource(&["cron"]);
        r.state = Some("absent".to_string());
        let script = apply_script(&r);
        assert!(script.contains("apt-get remove"));
        assert!(!script.contains("apt-get install"));
    }

    #[test]
    fn test_state_query_apt() {
        let r = make_apt_resource(&["cron"]);
        let script = state_query_script(&r);
        assert!(script.contains("dpkg-query -W"));
        assert!(script.contains("'cron=MISSING'"));
    }

    #[test]
    fn test_quoted_packages() {
        let r = make_apt_resource(&["cron", "lib; rm -rf /"]);
        let script = apply_script(&r);
        assert!(script.contains("'lib; rm -rf /'"));
    }

    #[test]
    fn test_missing_from_check() {
        let out = "installed:cron\nmissing:curl\n  missing:jq\n";
        assert_eq!(missing_from_check(out), vec!["curl", "jq"]);
    }

    #[test]
    fn test_check_script_runs_for_unknown_package() {
        let r = make_apt_resource(&["receta-no-such-package"]);
        let out = crate::transport::local::exec_local(&check_script(&r)).unwrap();
        assert!(out.success());
        assert_eq!(
            missing_from_check(&out.stdout),
            vec!["receta-no-such-package"]
        );
    }
}
