//! Concrete collaborators: OpenStack client, namespaces, HAProxy, metrics.

pub mod haproxy;
pub mod metrics;
pub mod netns;
pub mod openstack;

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::path::PathBuf;

    /// Write an executable `/bin/sh` script named `name` into `dir`.
    pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}")).expect("should write script");
        let mut permissions = fs::metadata(&path).expect("metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("should make script executable");
        path
    }
}
