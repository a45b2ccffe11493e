// ABOUTME: Derivation of every remote and local resource name from the application name.
// ABOUTME: Deploy and cleanup both go through these functions so they always agree.

use crate::types::AppName;
use std::path::{Path, PathBuf};

pub const SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
pub const SITES_ENABLED: &str = "/etc/nginx/sites-enabled";

/// Names of the remote resources that belong to one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    /// Directory the build context is mirrored into.
    pub remote_app_dir: String,
    /// nginx site definition.
    pub proxy_config_path: String,
    /// Symlink that enables the site.
    pub proxy_enabled_path: String,
    pub image_tag: String,
    pub container_name: String,
}

impl DeploymentTarget {
    pub fn derive(app: &AppName, remote_home: &str) -> Self {
        let home = remote_home.trim_end_matches('/');
        Self {
            remote_app_dir: format!("{home}/{app}"),
            proxy_config_path: format!("{SITES_AVAILABLE}/{app}.conf"),
            proxy_enabled_path: format!("{SITES_ENABLED}/{app}.conf"),
            image_tag: format!("{app}:latest"),
            container_name: app.to_string(),
        }
    }
}

/// Local directory holding the application's working tree.
pub fn local_checkout_dir(workdir: &Path, app: &AppName) -> PathBuf {
    workdir.join(app.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_all_names_from_app() {
        let app = AppName::new("demo").unwrap();
        let target = DeploymentTarget::derive(&app, "/home/deploy");

        assert_eq!(target.remote_app_dir, "/home/deploy/demo");
        assert_eq!(
            target.proxy_config_path,
            "/etc/nginx/sites-available/demo.conf"
        );
        assert_eq!(
            target.proxy_enabled_path,
            "/etc/nginx/sites-enabled/demo.conf"
        );
        assert_eq!(target.image_tag, "demo:latest");
        assert_eq!(target.container_name, "demo");
    }

    #[test]
    fn trailing_slash_on_home_is_ignored() {
        let app = AppName::default();
        let target = DeploymentTarget::derive(&app, "/root/");
        assert_eq!(target.remote_app_dir, "/root/app");
    }

    #[test]
    fn local_checkout_uses_app_name() {
        let app = AppName::new("demo").unwrap();
        assert_eq!(
            local_checkout_dir(Path::new("/srv/checkouts"), &app),
            PathBuf::from("/srv/checkouts/demo")
        );
    }
}
