use sidra::session::{SessionConfig, SessionMiddleware};
use sidra::{App, AppConfig, Context, Error, ResponseWriter};

async fn home(w: &mut ResponseWriter, _ctx: &mut Context) {
    w.set_header("content-type", "text/plain; charset=utf-8");
    w.write_str("hello from sidra\n");
}

async fn greet(w: &mut ResponseWriter, ctx: &mut Context) {
    let name = ctx.param("name").unwrap_or("stranger").to_owned();
    w.write_str(&format!("hi, {name}\n"));
}

async fn visits(w: &mut ResponseWriter, ctx: &mut Context) {
    let count = {
        let mut session = ctx.session();
        let count = session.get("visits").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
        session.set("visits", count);
        count
    };
    w.write_str(&format!("visit #{count}\n"));
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let session = SessionMiddleware::new(SessionConfig {
        secret: "change-me".to_owned(),
        ..SessionConfig::default()
    });
    let mut gc = session.gc_scheduler();

    let mut app = App::new(AppConfig::default());
    app.use_middleware(session);
    {
        let mut root = app.mount("/");
        root.get("home", "", home);
        root.get("greet", "greet/(?P<name>[^/]+)", greet);
        root.get("visits", "visits", visits);
    }

    tracing::info!("try: /  /greet/ada  /visits");
    gc.start();
    let served = app.serve().await;
    gc.stop().await;
    served
}
