mod feeder;
mod fixed;
