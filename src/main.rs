use log::{error, info, warn};

#[tokio::main]
async fn main()
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = match dxrelay::config::DxConfig::from_env()
    {   Ok(config) => config
      , Err(e) => {
          error!("{}", e);
          std::process::exit(2);
        }
    };

    for provider in [dxrelay::Provider::Gemini, dxrelay::Provider::OpenAi]
    {   if config.provider(provider).credential().is_none()
        {   warn!(
              "{} is not set; {} requests will be refused",
              provider.credential_var(),
              provider
            );
        }
    }
    info!(
      "Data dir: {}, static dir: {}",
      config.server.data_dir.display(),
      config.server.static_dir.display()
    );

    if let Err(e) = dxrelay::server::run(config).await
    {   error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}
