use gsp::{GspErr, QueryRequest, TimeoutConfig};

fn main() -> Result<(), GspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = QueryRequest::create("minecraft_bedrock", "www.example.com")?
        .with_timeout(TimeoutConfig::default().with_udp_read_ms(1500));
    let info = server.query()?;

    println!("{} on {}", info.name, info.map.as_deref().unwrap_or("?"));
    println!("{}", info);

    Ok(())
}
