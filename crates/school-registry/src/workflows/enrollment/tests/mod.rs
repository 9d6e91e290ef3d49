mod common;
mod migration;
