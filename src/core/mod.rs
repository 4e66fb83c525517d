pub mod db;
pub mod evidence;
