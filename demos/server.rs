use gsp::{GspErr, QueryRequest, TimeoutConfig};

fn main() -> Result<(), GspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let timeout = TimeoutConfig::from_json(r#"{ "tcp": { "connect_ms": 2000, "read_ms": 3000 } }"#)?;
    let server = QueryRequest::create("minecraft", "www.example.com:25565")?.with_timeout(timeout);

    println!("{}", server.query()?);

    Ok(())
}
