pub mod admin;
pub mod api;
pub mod auth;
pub mod owners;
pub mod packages;

use rocket::routes;

pub fn get_routes() -> Vec<rocket::Route> {
    routes![
        api::health_check,
        api::list_packages,
        api::storage_stats,
        api::search_packages,
        // npm auth
        auth::npm_login,
        auth::npm_whoami,
        auth::npm_logout,
        // npm owner
        owners::list_collaborators,
        owners::add_collaborator,
        owners::remove_collaborator,
        // Administration
        admin::gc_stats,
        admin::gc_analyze,
        admin::gc_run,
        admin::deprecate_package,
        admin::undeprecate_package,
        admin::list_owners,
        admin::add_owner,
        admin::remove_owner,
        admin::create_user,
        admin::delete_user,
        admin::list_webhooks,
        admin::create_webhook,
        admin::update_webhook,
        admin::delete_webhook,
        admin::test_webhook,
        // Registry protocol, scoped routes first
        packages::scoped_metadata,
        packages::scoped_tarball,
        packages::scoped_publish,
        packages::scoped_unpublish,
        packages::scoped_unpublish_rev,
        packages::scoped_unpublish_tarball,
        packages::regular_metadata,
        packages::regular_tarball,
        packages::regular_publish,
        packages::regular_unpublish,
        packages::regular_unpublish_rev,
        packages::regular_unpublish_tarball,
    ]
}
