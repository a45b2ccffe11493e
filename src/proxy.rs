// ABOUTME: Publishes the container behind nginx on port 80.
// ABOUTME: Writes the site, validates, and restores the previous site if nginx rejects it.

use crate::config::DeploymentTarget;
use crate::ssh::{self, RemoteShell, quote};
use crate::types::Port;
use thiserror::Error;

const INVALID_EXIT: u32 = 5;
const RELOAD_EXIT: u32 = 6;
const HEREDOC_TAG: &str = "GITSHIP_SITE";

#[derive(Debug, Error)]
pub enum ProxyConfigError {
    #[error(
        "nginx rejected the new site; previous configuration restored, rejected file kept at {rejected}:\n{output}"
    )]
    Validation { rejected: String, output: String },

    #[error("nginx configuration is valid but reloading nginx failed:\n{output}")]
    Reload { output: String },

    #[error("proxy configuration script exited with status {code}:\n{output}")]
    ScriptFailed { code: u32, output: String },

    #[error(transparent)]
    Ssh(#[from] ssh::Error),
}

/// nginx site forwarding port 80 to the container on the loopback interface.
pub fn render_site(container_port: Port) -> String {
    format!(
        r#"server {{
    listen 80;
    server_name _;

    location / {{
        proxy_pass http://127.0.0.1:{container_port};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}
"#
    )
}

/// Root script installing `site` at the target's config path.
pub fn configure_script(target: &DeploymentTarget, site: &str) -> String {
    format!(
        r#"set -u
CONF={conf}
LINK={link}
BACKUP="$CONF.previous"
REJECTED="$CONF.rejected"

mkdir -p "$(dirname "$CONF")" "$(dirname "$LINK")"

HAD_CONF=0
if [ -f "$CONF" ]; then cp -p "$CONF" "$BACKUP" && HAD_CONF=1; fi
HAD_LINK=0
if [ -e "$LINK" ] || [ -L "$LINK" ]; then HAD_LINK=1; fi

cat > "$CONF.new" <<'{tag}'
{site}{tag}
mv -f "$CONF.new" "$CONF"
if [ "$HAD_LINK" -eq 0 ]; then ln -s "$CONF" "$LINK"; fi

if ! CHECK=$(nginx -t 2>&1); then
    echo "$CHECK"
    cp -f "$CONF" "$REJECTED"
    if [ "$HAD_CONF" -eq 1 ]; then
        mv -f "$BACKUP" "$CONF"
    else
        rm -f "$CONF"
        if [ "$HAD_LINK" -eq 0 ]; then rm -f "$LINK"; fi
    fi
    echo "::proxy::invalid"
    exit {invalid}
fi
rm -f "$BACKUP" "$REJECTED"

if systemctl is-active --quiet nginx 2>/dev/null; then
    if ! systemctl reload nginx; then echo "::proxy::reload-failed"; exit {reload}; fi
elif pgrep -x nginx >/dev/null 2>&1; then
    if ! nginx -s reload; then echo "::proxy::reload-failed"; exit {reload}; fi
fi
if ! {{ systemctl enable --now nginx || service nginx start; }}; then
    echo "::proxy::reload-failed"
    exit {reload}
fi
echo "::proxy::active"
"#,
        conf = quote(&target.proxy_config_path),
        link = quote(&target.proxy_enabled_path),
        tag = HEREDOC_TAG,
        invalid = INVALID_EXIT,
        reload = RELOAD_EXIT,
    )
}

/// Install the site for `container_port`, validate it, then reload nginx.
pub async fn configure(
    shell: &dyn RemoteShell,
    target: &DeploymentTarget,
    container_port: Port,
) -> Result<(), ProxyConfigError> {
    tracing::info!(
        "Writing nginx site {} -> 127.0.0.1:{}",
        target.proxy_config_path,
        container_port
    );

    let script = configure_script(target, &render_site(container_port));
    let output = shell.run_privileged_script(&script).await?;

    match output.exit_code {
        0 => Ok(()),
        INVALID_EXIT => Err(ProxyConfigError::Validation {
            rejected: format!("{}.rejected", target.proxy_config_path),
            output: output.tail(20),
        }),
        RELOAD_EXIT => Err(ProxyConfigError::Reload {
            output: output.tail(20),
        }),
        code => Err(ProxyConfigError::ScriptFailed {
            code,
            output: output.tail(20),
        }),
    }
}
