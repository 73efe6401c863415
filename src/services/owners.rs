use crate::database::DatabaseService;
use crate::error::ApiError;
use crate::models::{AuthenticatedUser, OwnerInfo, User};
use crate::services::AuthService;
use log::info;

/// Collaborator management for `npm owner`: existing owners (or an administrator)
/// may add and remove other owners of a package.
pub struct OwnershipService;

impl OwnershipService {
    pub fn list(db: &DatabaseService, package: &str) -> Result<Vec<OwnerInfo>, ApiError> {
        Self::require_package(db, package)?;
        Ok(db.get_owner_details(package)?)
    }

    /// Adds `username` as a publishing owner. Adding an existing owner is a no-op.
    pub fn add(
        db: &DatabaseService,
        package: &str,
        username: &str,
        actor: &AuthenticatedUser,
    ) -> Result<OwnerInfo, ApiError> {
        Self::require_package(db, package)?;
        Self::require_owner(db, package, actor)?;
        let target = Self::require_user(db, username)?;

        if db.add_owner(package, target.id, true)? {
            info!("{} added {username} as owner of {package}", actor.username);
        }

        Ok(OwnerInfo {
            username: target.username,
            email: target.email,
            can_publish: true,
        })
    }

    pub fn remove(
        db: &DatabaseService,
        package: &str,
        username: &str,
        actor: &AuthenticatedUser,
    ) -> Result<(), ApiError> {
        Self::require_package(db, package)?;
        Self::require_owner(db, package, actor)?;
        let target = Self::require_user(db, username)?;

        if target.id == actor.user_id && !actor.is_admin {
            return Err(ApiError::BadRequest(format!(
                "{username} cannot remove themselves as owner of {package}"
            )));
        }
        if !db.remove_owner(package, target.id)? {
            return Err(ApiError::NotFound(format!("{username} does not own {package}")));
        }

        info!("{} removed {username} as owner of {package}", actor.username);
        Ok(())
    }

    fn require_package(db: &DatabaseService, package: &str) -> Result<(), ApiError> {
        match db.get_package_by_name(package)? {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(format!("Package '{package}' not found"))),
        }
    }

    fn require_owner(
        db: &DatabaseService,
        package: &str,
        actor: &AuthenticatedUser,
    ) -> Result<(), ApiError> {
        if actor.is_admin {
            return Ok(());
        }
        let owns = db
            .get_owners(package)?
            .iter()
            .any(|owner| owner.user_id == actor.user_id);
        if owns {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Only owners of {package} can manage its collaborators"
            )))
        }
    }

    fn require_user(db: &DatabaseService, username: &str) -> Result<User, ApiError> {
        AuthService::get_user_by_username(db, username)?
            .ok_or_else(|| ApiError::NotFound(format!("User '{username}' not found")))
    }
}
