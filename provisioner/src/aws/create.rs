use crate::{
    aws::{Client, Config, Error},
    sink::Directory,
    Interrupter, Pipeline,
};
use std::{fs::File, path::PathBuf};
use tracing::{info, warn};

/// Provisions the service described by the configuration at `config_path`
pub async fn create(config_path: &PathBuf) -> Result<(), Error> {
    // Load configuration from YAML file
    let config: Config = {
        let config_file = File::open(config_path)?;
        serde_yaml::from_reader(config_file)?
    };
    config.validate()?;
    let tag = &config.tag;
    info!(tag = tag.as_str(), region = config.region.as_str(), "loaded configuration");

    // Connect to AWS
    let client = Client::new(config.region.clone()).await;
    let sink = Directory::new(&config.key_directory);
    let pipeline = Pipeline::new(config.plan());
    info!(
        steps = pipeline.steps().len(),
        key_directory = ?sink.path(),
        "starting provisioning"
    );

    // Stop at the next step boundary (or wait attempt) on Ctrl-C
    let (interrupter, interrupt) = Interrupter::new();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received interrupt, stopping");
            interrupter.interrupt();
        }
    });

    let result = pipeline.run(&client, &sink, &interrupt).await;
    listener.abort();
    match result {
        Ok(registry) => {
            for (key, value) in registry.resources() {
                info!(key = key.as_str(), value = ?value, "provisioned");
            }
            info!(tag = tag.as_str(), "provisioning complete");
            Ok(())
        }
        Err(aborted) => {
            for (key, value) in aborted.registry.resources() {
                warn!(key = key.as_str(), value = ?value, "resource left in place");
            }
            Err(Error::Aborted(Box::new(aborted)))
        }
    }
}
