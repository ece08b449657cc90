mod engine;
mod queue;
