// ABOUTME: Brings the local working tree to the tip of the requested branch.
// ABOUTME: Clones on first run; later runs fetch, force-checkout and hard-reset.

use super::error::AcquisitionError;
use crate::config::ParameterSet;
use crate::types::{Secret, TOKEN_USER};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, RemoteCallbacks, Repository,
    ResetType,
};
use std::path::{Path, PathBuf};

const REMOTE: &str = "origin";
const NO_CREDENTIAL: &str = "repository requires authentication and no access token was supplied";
const CREDENTIAL_REJECTED: &str = "access token was rejected";

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    /// URL handed to git. Never carries the credential.
    pub url: String,
    /// Form of the URL used in logs and errors.
    pub display_url: String,
    pub credential: Secret,
    pub branch: String,
    pub destination: PathBuf,
}

impl SourceRequest {
    pub fn for_params(params: &ParameterSet) -> Self {
        Self {
            url: params.repository().as_str().to_string(),
            display_url: params.display_repository(),
            credential: params.credential().clone(),
            branch: params.branch().to_string(),
            destination: params.checkout_dir().to_path_buf(),
        }
    }
}

/// A working tree checked out at a known revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub path: PathBuf,
    /// Commit id of the checked-out tip.
    pub revision: String,
    /// True when this run created the clone.
    pub fresh_clone: bool,
}

/// Acquire the working tree without blocking the async runtime.
pub async fn acquire(request: SourceRequest) -> Result<Checkout, AcquisitionError> {
    tokio::task::spawn_blocking(move || acquire_blocking(&request))
        .await
        .map_err(|e| AcquisitionError::Task(e.to_string()))?
}

/// Clone, or re-synchronize an existing clone, so the tree matches the remote branch tip.
pub fn acquire_blocking(request: &SourceRequest) -> Result<Checkout, AcquisitionError> {
    let destination = &request.destination;

    if destination.exists() && !is_empty_dir(destination) {
        let repo = Repository::open(destination)
            .map_err(|_| AcquisitionError::NotAWorkingTree(destination.clone()))?;
        if repo.is_bare() {
            return Err(AcquisitionError::NotAWorkingTree(destination.clone()));
        }
        tracing::info!("Updating existing clone at {}", destination.display());
        return update(&repo, request);
    }

    tracing::info!(
        "Cloning {} ({}) into {}",
        request.display_url,
        request.branch,
        destination.display()
    );
    clone(request)
}

fn clone(request: &SourceRequest) -> Result<Checkout, AcquisitionError> {
    let branch = request.branch.clone();
    let mut builder = RepoBuilder::new();
    builder
        .branch(&request.branch)
        .fetch_options(fetch_options(&request.credential))
        .remote_create(move |repo, name, url| {
            repo.remote_with_fetch(name, url, &tracking_refspec(&branch))
        });

    let repo = builder
        .clone(&request.url, &request.destination)
        .map_err(|e| classify(e, request, Phase::Clone))?;

    let revision = repo
        .head()
        .and_then(|head| head.peel_to_commit())
        .map_err(|e| AcquisitionError::CloneFailed {
            url: request.display_url.clone(),
            message: e.message().to_string(),
        })?
        .id()
        .to_string();

    Ok(Checkout {
        path: request.destination.clone(),
        revision,
        fresh_clone: true,
    })
}

fn update(repo: &Repository, request: &SourceRequest) -> Result<Checkout, AcquisitionError> {
    let branch = &request.branch;
    let update_failed = |e: git2::Error| AcquisitionError::UpdateFailed {
        path: request.destination.clone(),
        message: e.message().to_string(),
    };

    // Point origin at the requested repository even if the clone was made from another URL.
    let mut remote = match repo.find_remote(REMOTE) {
        Ok(remote) if remote.url() == Some(request.url.as_str()) => remote,
        Ok(_) => {
            repo.remote_set_url(REMOTE, &request.url)
                .map_err(update_failed)?;
            repo.find_remote(REMOTE).map_err(update_failed)?
        }
        Err(_) => repo.remote(REMOTE, &request.url).map_err(update_failed)?,
    };

    let mut options = fetch_options(&request.credential);
    remote
        .fetch(&[tracking_refspec(branch)], Some(&mut options), None)
        .map_err(|e| classify(e, request, Phase::Update))?;

    // A stale tracking ref can outlive a branch deleted upstream; trust the advertisement.
    let remote_ref = format!("refs/heads/{branch}");
    let advertised = remote
        .list()
        .map(|heads| heads.iter().any(|h| h.name() == remote_ref))
        .unwrap_or(true);
    let branch_missing = || AcquisitionError::BranchNotFound {
        branch: branch.clone(),
        url: request.display_url.clone(),
    };
    if !advertised {
        return Err(branch_missing());
    }

    let tip = repo
        .find_reference(&format!("refs/remotes/{REMOTE}/{branch}"))
        .and_then(|r| r.peel_to_commit())
        .map_err(|_| branch_missing())?;

    // Detach first so the local branch can be force-moved even when it is checked out.
    repo.set_head_detached(tip.id()).map_err(update_failed)?;
    repo.branch(branch, &tip, true).map_err(update_failed)?;
    repo.set_head(&remote_ref).map_err(update_failed)?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.checkout_head(Some(&mut checkout))
        .map_err(update_failed)?;

    let mut reset_checkout = CheckoutBuilder::new();
    reset_checkout.force();
    repo.reset(tip.as_object(), ResetType::Hard, Some(&mut reset_checkout))
        .map_err(update_failed)?;

    Ok(Checkout {
        path: request.destination.clone(),
        revision: tip.id().to_string(),
        fresh_clone: false,
    })
}

fn tracking_refspec(branch: &str) -> String {
    format!("+refs/heads/{branch}:refs/remotes/{REMOTE}/{branch}")
}

/// Fetch options that hand the token to libgit2 only when the server asks for it.
fn fetch_options(credential: &Secret) -> FetchOptions<'static> {
    let token = credential.clone();
    let mut attempted = false;

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed_types| {
        if token.is_empty() || !allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Err(git2::Error::from_str(NO_CREDENTIAL));
        }
        // libgit2 asks again after a rejected attempt; give up instead of looping.
        if attempted {
            return Err(git2::Error::from_str(CREDENTIAL_REJECTED));
        }
        attempted = true;
        Cred::userpass_plaintext(username_from_url.unwrap_or(TOKEN_USER), token.expose())
    });

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Clone,
    Update,
}

/// Map a libgit2 failure onto the acquisition taxonomy.
fn classify(error: git2::Error, request: &SourceRequest, phase: Phase) -> AcquisitionError {
    let message = error.message();
    let auth_failure = error.code() == ErrorCode::Auth
        || message.contains(NO_CREDENTIAL)
        || message.contains(CREDENTIAL_REJECTED)
        || (error.class() == ErrorClass::Http && message.contains("401"));

    if auth_failure {
        return AcquisitionError::AuthenticationRejected {
            url: request.display_url.clone(),
        };
    }

    if error.code() == ErrorCode::NotFound {
        return AcquisitionError::BranchNotFound {
            branch: request.branch.clone(),
            url: request.display_url.clone(),
        };
    }

    match phase {
        Phase::Clone => AcquisitionError::CloneFailed {
            url: request.display_url.clone(),
            message: message.to_string(),
        },
        Phase::Update => AcquisitionError::UpdateFailed {
            path: request.destination.clone(),
            message: message.to_string(),
        },
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
