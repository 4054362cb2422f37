mod filters;
mod service;
mod support;
