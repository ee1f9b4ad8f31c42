pub mod country;
pub mod observation;
pub mod source;
pub mod work_item;
