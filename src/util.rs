const DEFAULT_AGENT_PORT: u16 = crate::monitoring::collector::DEFAULT_AGENT_PORT;

pub fn get_default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

const FLEET_CONFIG: &str = "FLEET_CONFIG";

/// Config path from the environment, used when no `-f` is given
pub fn get_config_path() -> Option<String> {
    std::env::var(FLEET_CONFIG).ok().filter(|path| !path.is_empty())
}

const FLEET_QUEUE_PREFIX: &str = "FLEET_QUEUE_PREFIX";

pub fn get_queue_prefix() -> Option<String> {
    let prefix_from_env = std::env::var(FLEET_QUEUE_PREFIX);
    prefix_from_env.ok().filter(|prefix| !prefix.is_empty())
}
