use log::error;

#[rocket::main]
async fn main() {
    env_logger::init();

    let rocket = match cellar::create_rocket() {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Startup failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = rocket.launch().await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
