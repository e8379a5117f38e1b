mod balancer_config;

pub use balancer_config::BalancerConfig;
