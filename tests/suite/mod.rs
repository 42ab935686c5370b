mod dispatch;
mod service;
mod wire;
