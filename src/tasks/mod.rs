pub mod compass;
