use gsp::GspErr;

/// cargo run --example query -- tf2 127.0.0.1:27015
fn main() -> Result<(), GspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let game_id = args.next().unwrap_or_else(|| "minecraft".into());
    let address = args.next().unwrap_or_else(|| "www.example.com".into());

    println!("{}", gsp::query(&game_id, &address, None)?);

    Ok(())
}
