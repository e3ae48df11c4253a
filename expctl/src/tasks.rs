// List the different tasks here
pub mod compspec;
pub mod experiments;
pub mod jobspecs;
pub mod kubectl;
