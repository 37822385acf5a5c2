mod lifecycle;
mod ranking;
