/*!
LanRoom Client 库

提供访问控制面HTTPS接口的类型化客户端。
*/

pub mod api;

pub use api::{ClientError, ControlClient};
