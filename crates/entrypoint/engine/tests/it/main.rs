mod properties;
mod rollback;
mod scenario;
mod throttle;
