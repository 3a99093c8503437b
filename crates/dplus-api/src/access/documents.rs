//! Document retrieval for a matched patient.

use dplus_core::{MedicalDocument, UserId};

use crate::directory::{Directory, DirectoryError};

/// All documents of `user_id`, newest first.
///
/// Rows belonging to another user are dropped even if the store returned
/// them.
pub async fn retrieve(
    directory: &dyn Directory,
    user_id: UserId,
) -> Result<Vec<MedicalDocument>, DirectoryError> {
    let mut documents: Vec<MedicalDocument> = directory
        .documents_for_user(user_id)
        .await?
        .into_iter()
        .filter(|d| d.user_id == user_id)
        .collect();
    documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(documents)
}
