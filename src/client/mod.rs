//! Consumer side: a [Reference] is resolved into a [ServiceProxy] that calls
//! the remote service through the cluster layer.
//!
//! ```ignore
//! let ext = Arc::new(Extensions::with_defaults()?);
//! let proxy = Reference::new(ext, "demo.Calculator")
//!     .version("1.0")
//!     .registry(Url::registry("memory", "127.0.0.1", 2181))
//!     .build()
//!     .await?;
//! let sum: i64 = proxy.call("add", &(1, 2)).await?;
//! ```

mod proxy;
pub use proxy::{ResponseFuture, ServiceProxy};
mod reference;
pub use reference::Reference;

/// Generate a typed client over a [ServiceProxy].
///
/// Arguments are sent as one tuple, the provider registers the method with the
/// same tuple type (see [ServiceBuilder](crate::server::ServiceBuilder)).
/// Return types implement `Default`, which is what a failsafe reference yields
/// when the call failed.
///
/// ```ignore
/// service_client! {
///     pub struct CalculatorClient("demo.Calculator") {
///         fn add(a: i64, b: i64) -> i64;
///         fn reset() -> ();
///     }
/// }
/// ```
#[macro_export]
macro_rules! service_client {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($interface:literal) {
            $( fn $method:ident ( $( $arg:ident : $ty:ty ),* $(,)? ) -> $ret:ty ; )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            proxy: $crate::client::ServiceProxy,
        }

        impl $name {
            pub const INTERFACE: &'static str = $interface;

            pub fn new(proxy: $crate::client::ServiceProxy) -> Self {
                Self { proxy }
            }

            #[inline]
            pub fn proxy(&self) -> &$crate::client::ServiceProxy {
                &self.proxy
            }

            $(
                pub async fn $method(&self, $( $arg: $ty ),*) -> Result<$ret, $crate::error::RpcError> {
                    self.proxy.call(stringify!($method), &( $( $arg, )* )).await
                }
            )*
        }
    };
}
