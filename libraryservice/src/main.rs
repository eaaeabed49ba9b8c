use std::sync::Arc;

use actix_web::{App, HttpServer};
use anyhow::Context;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use libraryservice::app_config::{config_app, json_config, query_config};
use libraryservice::auth::{ensure_admin, Authenticator};
use libraryservice::books_repository::{
    BooksRepository, InMemoryBooksRepository, PostgresBooksRepository,
};
use libraryservice::borrows_repository::{
    BorrowsRepository, InMemoryBorrowsRepository, PostgresBorrowsRepository,
};
use libraryservice::circulation::Circulation;
use libraryservice::postgres;
use libraryservice::settings::Settings;
use libraryservice::telemetry::init_telemetry;
use libraryservice::users_repository::{
    InMemoryUsersRepository, PostgresUsersRepository, UsersRepository,
};

struct Repositories {
    users: Arc<dyn UsersRepository>,
    books: Arc<dyn BooksRepository>,
    borrows: Arc<dyn BorrowsRepository>,
}

async fn init_repositories(settings: &Settings) -> anyhow::Result<Repositories> {
    if settings.database.in_memory {
        tracing::info!("Using in-memory repositories");
        return Ok(Repositories {
            users: Arc::new(InMemoryUsersRepository::default()),
            books: Arc::new(InMemoryBooksRepository::default()),
            borrows: Arc::new(InMemoryBorrowsRepository::default()),
        });
    }

    let client = postgres::connect(&settings.postgres_config()).await?;
    Ok(Repositories {
        users: Arc::new(PostgresUsersRepository::init(client.clone()).await?),
        books: Arc::new(PostgresBooksRepository::init(client.clone()).await?),
        borrows: Arc::new(PostgresBorrowsRepository::init(client).await?),
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_telemetry(&settings.telemetry)?;
    if settings.uses_default_jwt_secret() {
        tracing::warn!(
            "auth.jwt_secret is the built-in default, set LIBRARYSERVICE__AUTH__JWT_SECRET"
        );
    }

    let repositories = init_repositories(&settings)
        .await
        .context("Failed to init repositories")?;
    let authenticator = web::Data::new(Authenticator::new(&settings.auth));

    if let Some(admin) = &settings.bootstrap_admin {
        ensure_admin(repositories.users.as_ref(), &authenticator, admin)
            .await
            .context("Failed to create admin account")?;
    }

    let circulation = web::Data::new(Circulation::new(
        repositories.users.clone(),
        repositories.books.clone(),
        repositories.borrows.clone(),
        settings.borrow_policy(),
    ));
    let users = repositories.users;
    let books = repositories.books;

    let address = (settings.server.host.clone(), settings.server.port);
    tracing::info!(
        "Starting HTTP server at http://{}:{}",
        address.0,
        address.1
    );

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(web::Data::new(users.clone()))
            .app_data(web::Data::new(books.clone()))
            .app_data(authenticator.clone())
            .app_data(circulation.clone())
            .app_data(json_config())
            .app_data(query_config())
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind(address)
    .context("Failed to bind server address")?
    .run()
    .await
    .context("HTTP server failed")
}
