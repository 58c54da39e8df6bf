//! # Dockerfile Rendering
//!
//! The image a resource runs in is the Terraform base image with the
//! repository copied in, plus whatever the selected backend needs.

use crate::crd::GitRepo;
use sha2::{Digest, Sha256};

/// Render the Dockerfile for a resource
///
/// Backend additions are only appended when a backend provider was resolved.
#[must_use]
pub fn render(base_image: &str, additions: &str, provider_exists: bool) -> String {
    let mut dockerfile = format!("FROM {base_image}\nWORKDIR /app\nCOPY . .\n");

    let additions = additions.trim();
    if provider_exists && !additions.is_empty() {
        dockerfile.push_str(additions);
        dockerfile.push('\n');
    }

    dockerfile
}

/// Tag the image for a build
///
/// The tag is derived from everything that shapes the image, so the same
/// repository, branch and Dockerfile always produce the same reference.
#[must_use]
pub fn tagged_image(image_name: &str, git_repo: &GitRepo, dockerfile: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(git_repo.url.as_bytes());
    hasher.update([0]);
    hasher.update(git_repo.branch.as_bytes());
    hasher.update([0]);
    hasher.update(dockerfile.as_bytes());
    let digest = hasher.finalize();

    let tag: String = digest
        .iter()
        .take(6)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("{}:{tag}", image_name.trim())
}
