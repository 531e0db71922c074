//! Service and group registration.
//!
//! A [`Service`] wraps a [`Substrate`] and carries one middleware chain per
//! handler flavor plus a default context. Endpoints are composed once, when
//! they are registered; the substrate only ever sees a plain [`Handler`].
//!
//! Deriving with `with_*_middleware` copies the chains and the current
//! default context, so later additions on either side never leak into the
//! other. A group created with `add_group` copies the chains but shares the
//! default context with the service it came from.
//!
//! # Example
//!
//! ```ignore
//! let service = Service::new(MemoryService::new(ServiceConfig::new("users", "1.0.0")))
//!     .with_context_middleware(RequestIdMiddleware::default())
//!     .with_micro_middleware(CompressionMiddleware::default());
//!
//! let v1 = service.add_group("users.v1");
//! v1.add_micro_endpoint("get", get_user, EndpointOptions::new())?;
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use crate::chain::{Middleware, MiddlewareChain};
use crate::config::EndpointOptions;
use crate::context::Context;
use crate::error::{log_send_failure, report_error};
use crate::handler::{BoxFuture, ContextHandler, Handler, MicroHandler};
use crate::message::MicroRequest;
use crate::request::Request;
use crate::transport::{
    EndpointSpec, Message, ServiceInfo, ServiceStats, Substrate, TransportError,
};

/// The context every context and micro invocation starts from.
///
/// Read on each delivery, so a change reaches endpoints that are already
/// registered.
#[derive(Clone)]
struct DefaultContext(Arc<RwLock<Context>>);

impl DefaultContext {
    fn new(ctx: Context) -> Self {
        Self(Arc::new(RwLock::new(ctx)))
    }

    fn get(&self) -> Context {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, ctx: Context) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = ctx;
    }

    /// A detached cell holding the current value.
    fn snapshot(&self) -> Self {
        Self::new(self.get())
    }
}

/// Everything a registration needs: where to register, under which
/// prefix, and which chains to compose.
#[derive(Clone)]
struct Scope {
    substrate: Arc<dyn Substrate>,
    prefix: String,
    plain: MiddlewareChain<Handler>,
    context: MiddlewareChain<ContextHandler>,
    micro: MiddlewareChain<MicroHandler>,
    default_ctx: DefaultContext,
}

impl Scope {
    fn spec(&self, name: &str, opts: EndpointOptions) -> EndpointSpec {
        let subject = opts.subject.unwrap_or_else(|| name.to_string());
        EndpointSpec {
            name: name.to_string(),
            subject: format!("{}{}", self.prefix, subject),
            queue_group: opts.queue_group,
            metadata: opts.metadata,
        }
    }

    // Shares the default context cell.
    fn group(&self, name: &str) -> Scope {
        Scope {
            prefix: format!("{}{}.", self.prefix, name),
            ..self.clone()
        }
    }

    // Snapshots the default context.
    fn derive(&self) -> Scope {
        Scope {
            default_ctx: self.default_ctx.snapshot(),
            ..self.clone()
        }
    }

    fn with_plain<M>(&self, middleware: M) -> Scope
    where
        M: Middleware<Handler> + 'static,
    {
        let mut scope = self.derive();
        scope.plain = scope.plain.with(middleware);
        scope
    }

    fn with_context<M>(&self, middleware: M) -> Scope
    where
        M: Middleware<ContextHandler> + 'static,
    {
        let mut scope = self.derive();
        scope.context = scope.context.with(middleware);
        scope
    }

    fn with_micro<M>(&self, middleware: M) -> Scope
    where
        M: Middleware<MicroHandler> + 'static,
    {
        let mut scope = self.derive();
        scope.micro = scope.micro.with(middleware);
        scope
    }

    fn add_endpoint(
        &self,
        name: &str,
        handler: Handler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.substrate
            .add_endpoint(self.spec(name, opts), self.plain.wrap(handler))
    }

    fn add_context_endpoint(
        &self,
        name: &str,
        handler: ContextHandler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        let composed = self.context.wrap(handler);
        self.substrate.add_endpoint(
            self.spec(name, opts),
            context_endpoint(composed, self.default_ctx.clone()),
        )
    }

    fn add_micro_endpoint(
        &self,
        name: &str,
        handler: MicroHandler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        let composed = self.micro.wrap(handler);
        self.substrate.add_endpoint(
            self.spec(name, opts),
            micro_endpoint(composed, self.default_ctx.clone()),
        )
    }
}

/// Adapt a composed context chain to the transport.
///
/// Successful invocations send nothing: the handler replies itself. A
/// returned error is reported to the caller.
fn context_endpoint(composed: ContextHandler, default_ctx: DefaultContext) -> Handler {
    Arc::new(move |msg: Message| -> BoxFuture<'static, ()> {
        let composed = composed.clone();
        let req = Request::new(msg.clone(), default_ctx.get());
        Box::pin(async move {
            if let Err(err) = composed(req).await {
                let _ = report_error(msg.as_ref(), err);
            }
        })
    })
}

/// Adapt a composed micro chain to the transport.
///
/// The returned reply is sent on success; an error is reported.
fn micro_endpoint(composed: MicroHandler, default_ctx: DefaultContext) -> Handler {
    Arc::new(move |msg: Message| -> BoxFuture<'static, ()> {
        let composed = composed.clone();
        let req = MicroRequest::from_message(msg.as_ref(), default_ctx.get());
        Box::pin(async move {
            match composed(req).await {
                Ok(reply) => {
                    log_send_failure(msg.subject(), msg.respond(reply.data, reply.headers));
                }
                Err(err) => {
                    let _ = report_error(msg.as_ref(), err);
                }
            }
        })
    })
}

/// A micro-service with middleware support.
///
/// Clones share the default context.
#[derive(Clone)]
pub struct Service {
    scope: Scope,
}

impl Service {
    /// Wrap a substrate. All chains start empty and the default context is
    /// the background context.
    pub fn new<S>(substrate: S) -> Self
    where
        S: Substrate + 'static,
    {
        Self::from_arc(Arc::new(substrate))
    }

    /// Wrap a substrate with an initial plain chain.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let chain = MiddlewareChain::<Handler>::new().with(MetricsMiddleware::new());
    /// let service = Service::with_chain(substrate, chain);
    /// service.add_endpoint("echo", echo, EndpointOptions::new().subject("svc.echo"))?;
    /// ```
    pub fn with_chain<S>(substrate: S, chain: MiddlewareChain<Handler>) -> Self
    where
        S: Substrate + 'static,
    {
        let mut service = Self::new(substrate);
        service.scope.plain = chain;
        service
    }

    /// Wrap a shared substrate.
    pub fn from_arc(substrate: Arc<dyn Substrate>) -> Self {
        Self {
            scope: Scope {
                substrate,
                prefix: String::new(),
                plain: MiddlewareChain::new(),
                context: MiddlewareChain::new(),
                micro: MiddlewareChain::new(),
                default_ctx: DefaultContext::new(Context::background()),
            },
        }
    }

    /// The underlying substrate.
    pub fn substrate(&self) -> &Arc<dyn Substrate> {
        &self.scope.substrate
    }

    /// Return a new service whose plain chain ends with `middleware`.
    pub fn with_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<Handler> + 'static,
    {
        Self {
            scope: self.scope.with_plain(middleware),
        }
    }

    /// Alias for [`Service::with_middleware`].
    pub fn use_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<Handler> + 'static,
    {
        self.with_middleware(middleware)
    }

    /// Return a new service whose context chain ends with `middleware`.
    pub fn with_context_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<ContextHandler> + 'static,
    {
        Self {
            scope: self.scope.with_context(middleware),
        }
    }

    /// Alias for [`Service::with_context_middleware`].
    pub fn use_context<M>(&self, middleware: M) -> Self
    where
        M: Middleware<ContextHandler> + 'static,
    {
        self.with_context_middleware(middleware)
    }

    /// Return a new service whose micro chain ends with `middleware`.
    pub fn with_micro_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<MicroHandler> + 'static,
    {
        Self {
            scope: self.scope.with_micro(middleware),
        }
    }

    /// Alias for [`Service::with_micro_middleware`].
    pub fn use_micro<M>(&self, middleware: M) -> Self
    where
        M: Middleware<MicroHandler> + 'static,
    {
        self.with_micro_middleware(middleware)
    }

    /// Set the context that context and micro endpoints start from.
    ///
    /// Applies to every later invocation, including endpoints registered
    /// before the call and endpoints of groups created from this service.
    /// Services derived with `with_*_middleware` keep the value they were
    /// derived with.
    pub fn set_default_context(&self, ctx: Context) {
        self.scope.default_ctx.set(ctx);
    }

    /// The current default context.
    pub fn default_context(&self) -> Context {
        self.scope.default_ctx.get()
    }

    /// Register a plain endpoint.
    pub fn add_endpoint(
        &self,
        name: &str,
        handler: Handler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.scope.add_endpoint(name, handler, opts)
    }

    /// Register a context endpoint.
    pub fn add_context_endpoint(
        &self,
        name: &str,
        handler: ContextHandler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.scope.add_context_endpoint(name, handler, opts)
    }

    /// Register a micro endpoint.
    pub fn add_micro_endpoint(
        &self,
        name: &str,
        handler: MicroHandler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.scope.add_micro_endpoint(name, handler, opts)
    }

    /// Create a group whose endpoint subjects are prefixed with `name.`.
    pub fn add_group(&self, name: &str) -> Group {
        Group {
            scope: self.scope.group(name),
        }
    }

    pub fn info(&self) -> ServiceInfo {
        self.scope.substrate.info()
    }

    pub fn stats(&self) -> ServiceStats {
        self.scope.substrate.stats()
    }

    pub fn reset(&self) {
        self.scope.substrate.reset()
    }

    pub fn stop(&self) -> Result<(), TransportError> {
        self.scope.substrate.stop()
    }

    pub fn stopped(&self) -> bool {
        self.scope.substrate.stopped()
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("middleware", &self.scope.plain)
            .field("context_middleware", &self.scope.context)
            .field("micro_middleware", &self.scope.micro)
            .field("default_ctx", &self.scope.default_ctx.get())
            .finish()
    }
}

/// A set of endpoints sharing a subject prefix.
///
/// A group starts with a copy of its parent's chains and follows its
/// parent's default context.
#[derive(Clone)]
pub struct Group {
    scope: Scope,
}

impl Group {
    /// Subject prefix, trailing dot included.
    pub fn prefix(&self) -> &str {
        &self.scope.prefix
    }

    /// Create a nested group.
    pub fn add_group(&self, name: &str) -> Group {
        Group {
            scope: self.scope.group(name),
        }
    }

    pub fn with_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<Handler> + 'static,
    {
        Self {
            scope: self.scope.with_plain(middleware),
        }
    }

    pub fn use_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<Handler> + 'static,
    {
        self.with_middleware(middleware)
    }

    pub fn with_context_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<ContextHandler> + 'static,
    {
        Self {
            scope: self.scope.with_context(middleware),
        }
    }

    pub fn use_context<M>(&self, middleware: M) -> Self
    where
        M: Middleware<ContextHandler> + 'static,
    {
        self.with_context_middleware(middleware)
    }

    pub fn with_micro_middleware<M>(&self, middleware: M) -> Self
    where
        M: Middleware<MicroHandler> + 'static,
    {
        Self {
            scope: self.scope.with_micro(middleware),
        }
    }

    pub fn use_micro<M>(&self, middleware: M) -> Self
    where
        M: Middleware<MicroHandler> + 'static,
    {
        self.with_micro_middleware(middleware)
    }

    /// Register a plain endpoint under the group prefix.
    pub fn add_endpoint(
        &self,
        name: &str,
        handler: Handler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.scope.add_endpoint(name, handler, opts)
    }

    /// Register a context endpoint under the group prefix.
    pub fn add_context_endpoint(
        &self,
        name: &str,
        handler: ContextHandler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.scope.add_context_endpoint(name, handler, opts)
    }

    /// Register a micro endpoint under the group prefix.
    pub fn add_micro_endpoint(
        &self,
        name: &str,
        handler: MicroHandler,
        opts: EndpointOptions,
    ) -> Result<(), TransportError> {
        self.scope.add_micro_endpoint(name, handler, opts)
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("prefix", &self.scope.prefix)
            .field("middleware", &self.scope.plain)
            .field("context_middleware", &self.scope.context)
            .field("micro_middleware", &self.scope.micro)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use micromw_core::{HandlerError, Headers, StructuredError};

    use crate::chain::from_fn;
    use crate::config::ServiceConfig;
    use crate::handler::{context_handler_fn, handler_fn, micro_handler_fn};
    use crate::message::MicroReply;
    use crate::transport::memory::MemoryService;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[derive(Debug, PartialEq)]
    struct Key1(String);

    #[derive(Debug, PartialEq)]
    struct Key2(String);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Trail(Vec<&'static str>);

    fn memory() -> MemoryService {
        MemoryService::new(ServiceConfig::new("test", "0.0.1"))
    }

    // Appends `name` to the Trail carried in the context.
    fn mark(name: &'static str) -> impl Middleware<ContextHandler> {
        from_fn(move |next: ContextHandler| -> ContextHandler {
            Arc::new(
                move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
                    let mut trail = req.context().value::<Trail>().cloned().unwrap_or_default();
                    trail.0.push(name);
                    let req = req.with_context(req.context().with_value(trail));
                    next(req)
                },
            )
        })
    }

    fn reply_trail() -> ContextHandler {
        context_handler_fn(|req: Request| async move {
            let trail = req
                .context()
                .value::<Trail>()
                .map(|trail| trail.0.join(","))
                .unwrap_or_default();
            req.respond(trail)?;
            Ok(())
        })
    }

    async fn call(mem: &MemoryService, subject: &str) -> String {
        let reply = mem
            .request(subject, Headers::new(), Bytes::new(), TIMEOUT)
            .await
            .unwrap();
        String::from_utf8(reply.data.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_context_middleware_passes_values() {
        let mem = memory();
        let set_key1 = from_fn(|next: ContextHandler| -> ContextHandler {
            Arc::new(
                move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
                    let ctx = req.context().with_value(Key1("value1".into()));
                    next(req.with_context(ctx))
                },
            )
        });
        let set_key2 = from_fn(|next: ContextHandler| -> ContextHandler {
            Arc::new(
                move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
                    let ctx = req.context().with_value(Key2("value2".into()));
                    next(req.with_context(ctx))
                },
            )
        });

        let svc = Service::new(mem.clone())
            .with_context_middleware(set_key1)
            .with_context_middleware(set_key2);
        let handler = context_handler_fn(|req: Request| async move {
            let key1 = req.context().value::<Key1>().map(|k| k.0.as_str()).unwrap_or("");
            let key2 = req.context().value::<Key2>().map(|k| k.0.as_str()).unwrap_or("");
            req.respond(format!("{key1},{key2}"))?;
            Ok(())
        });
        svc.add_context_endpoint("foo", handler, EndpointOptions::new())
            .unwrap();

        assert_eq!(call(&mem, "foo").await, "value1,value2");
    }

    #[tokio::test]
    async fn test_plain_middleware_can_short_circuit() {
        let mem = memory();
        let auth = from_fn(|next: Handler| -> Handler {
            Arc::new(move |msg: Message| -> BoxFuture<'static, ()> {
                if msg.headers().get("token") == "secret" {
                    next(msg)
                } else {
                    Box::pin(async move {
                        let _ = msg.error("401", "unauthorized", Bytes::new(), Headers::new());
                    })
                }
            })
        });
        let svc = Service::new(mem.clone()).with_middleware(auth);
        let echo = handler_fn(|msg: Message| async move {
            let _ = msg.respond(msg.data().clone(), Headers::new());
        });
        svc.add_endpoint("echo", echo, EndpointOptions::new()).unwrap();

        let denied = mem
            .request("echo", Headers::new(), "hi", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(denied.error_code(), Some("401"));

        let mut headers = Headers::new();
        headers.set("token", "secret");
        let allowed = mem.request("echo", headers, "hi", TIMEOUT).await.unwrap();
        assert!(!allowed.is_error());
        assert_eq!(allowed.data, Bytes::from("hi"));
    }

    #[tokio::test]
    async fn test_group_prefixes_subject() {
        let mem = memory();
        let svc = Service::new(mem.clone()).with_context_middleware(mark("A"));
        let grp = svc.add_group("grp");
        assert_eq!(grp.prefix(), "grp.");

        grp.add_context_endpoint("foo2", reply_trail(), EndpointOptions::new())
            .unwrap();
        grp.add_group("nested")
            .add_context_endpoint("x", reply_trail(), EndpointOptions::new().subject("y"))
            .unwrap();

        assert_eq!(call(&mem, "grp.foo2").await, "A");
        assert_eq!(call(&mem, "grp.nested.y").await, "A");

        let names: Vec<_> = svc.info().endpoints.into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["foo2", "x"]);
    }

    #[tokio::test]
    async fn test_group_middleware_does_not_leak() {
        let mem = memory();
        let svc = Service::new(mem.clone()).with_context_middleware(mark("A"));
        let g1 = svc.add_group("g1").with_context_middleware(mark("B"));
        let g2 = svc.add_group("g2");
        let svc = svc.with_context_middleware(mark("C"));

        g1.add_context_endpoint("e", reply_trail(), EndpointOptions::new())
            .unwrap();
        g2.add_context_endpoint("e", reply_trail(), EndpointOptions::new())
            .unwrap();
        svc.add_context_endpoint("root", reply_trail(), EndpointOptions::new())
            .unwrap();

        assert_eq!(call(&mem, "g1.e").await, "A,B");
        assert_eq!(call(&mem, "g2.e").await, "A");
        assert_eq!(call(&mem, "root").await, "A,C");
    }

    #[tokio::test]
    async fn test_context_error_is_normalized() {
        let mem = memory();
        let svc = Service::new(mem.clone());
        let failing = context_handler_fn(|_req: Request| async move {
            Err(HandlerError::from("request failed"))
        });
        svc.add_context_endpoint("fail", failing, EndpointOptions::new())
            .unwrap();

        let reply = mem
            .request("fail", Headers::new(), Bytes::new(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(
            reply.data,
            Bytes::from_static(br#"{"description":"request failed","code":"500"}"#)
        );
        assert_eq!(reply.error_code(), Some("500"));
        assert_eq!(reply.error_description(), Some("request failed"));
        assert_eq!(svc.stats().endpoints[0].num_errors, 1);
    }

    #[tokio::test]
    async fn test_structured_error_passes_through() {
        let mem = memory();
        let svc = Service::new(mem.clone());
        let missing = micro_handler_fn(|_req: MicroRequest| async move {
            Err(HandlerError::not_found("no such user"))
        });
        svc.add_micro_endpoint("get", missing, EndpointOptions::new())
            .unwrap();

        let reply = mem
            .request("get", Headers::new(), Bytes::new(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply.error_code(), Some("404"));
        assert_eq!(
            StructuredError::from_json(&reply.data).unwrap(),
            StructuredError::new("404", "no such user")
        );
    }

    #[tokio::test]
    async fn test_micro_middleware_rewrites_reply() {
        let mem = memory();
        let greet = from_fn(|next: MicroHandler| -> MicroHandler {
            Arc::new(
                move |req: MicroRequest| -> BoxFuture<'static, Result<MicroReply, HandlerError>> {
                    let next = next.clone();
                    Box::pin(async move {
                        let mut reply = next(req).await?;
                        let mut data = b"Hello from middleware: ".to_vec();
                        data.extend_from_slice(&reply.data);
                        reply.data = data.into();
                        Ok(reply)
                    })
                },
            )
        });
        let svc = Service::new(mem.clone()).with_micro_middleware(greet);
        let echo = micro_handler_fn(|req: MicroRequest| async move {
            Ok(MicroReply::from_request(req.data.clone(), &req))
        });
        svc.add_micro_endpoint("echo", echo, EndpointOptions::new())
            .unwrap();

        let mut headers = Headers::new();
        headers.set("x", "1");
        let reply = mem.request("echo", headers, "world", TIMEOUT).await.unwrap();
        assert_eq!(reply.data, Bytes::from("Hello from middleware: world"));
        assert_eq!(reply.headers.get("x"), "1");
    }

    #[derive(Debug, PartialEq)]
    struct Tenant(&'static str);

    fn reply_tenant() -> ContextHandler {
        context_handler_fn(|req: Request| async move {
            let tenant = req.context().value::<Tenant>().map(|t| t.0).unwrap_or("none");
            req.respond(tenant)?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_default_context_is_read_per_invocation() {
        let mem = memory();
        let svc = Service::new(mem.clone());

        svc.add_context_endpoint("early", reply_tenant(), EndpointOptions::new())
            .unwrap();
        let grp = svc.add_group("g");
        assert_eq!(call(&mem, "early").await, "none");

        svc.set_default_context(Context::background().with_value(Tenant("acme")));
        grp.add_context_endpoint("late", reply_tenant(), EndpointOptions::new())
            .unwrap();

        assert_eq!(call(&mem, "early").await, "acme");
        assert_eq!(call(&mem, "g.late").await, "acme");
        assert_eq!(svc.default_context().value::<Tenant>(), Some(&Tenant("acme")));
    }

    #[tokio::test]
    async fn test_default_context_reaches_micro_endpoints() {
        let mem = memory();
        let svc = Service::new(mem.clone());
        let tenant = micro_handler_fn(|req: MicroRequest| async move {
            let tenant = req.context().value::<Tenant>().map(|t| t.0).unwrap_or("none");
            Ok(MicroReply::new(tenant))
        });
        svc.add_group("m")
            .add_micro_endpoint("t", tenant, EndpointOptions::new())
            .unwrap();

        assert_eq!(call(&mem, "m.t").await, "none");
        svc.set_default_context(Context::background().with_value(Tenant("beta")));
        assert_eq!(call(&mem, "m.t").await, "beta");
    }

    #[tokio::test]
    async fn test_derived_service_keeps_its_default_context() {
        let mem = memory();
        let svc = Service::new(mem.clone());
        svc.set_default_context(Context::background().with_value(Tenant("acme")));

        let derived = svc.with_context_middleware(mark("A"));
        derived
            .add_context_endpoint("derived", reply_tenant(), EndpointOptions::new())
            .unwrap();
        svc.add_context_endpoint("root", reply_tenant(), EndpointOptions::new())
            .unwrap();

        svc.set_default_context(Context::background().with_value(Tenant("other")));
        assert_eq!(call(&mem, "root").await, "other");
        assert_eq!(call(&mem, "derived").await, "acme");

        derived.set_default_context(Context::background());
        assert_eq!(call(&mem, "derived").await, "none");
        assert_eq!(call(&mem, "root").await, "other");
    }

    #[tokio::test]
    async fn test_use_aliases_and_initial_chain() {
        let mem = memory();
        let tag = |name: &'static str| {
            from_fn(move |next: Handler| -> Handler {
                Arc::new(move |msg: Message| -> BoxFuture<'static, ()> {
                    if msg.headers().get("tag").is_empty() {
                        let _ = msg.respond(Bytes::from(name), Headers::new());
                        return Box::pin(async {});
                    }
                    next(msg)
                })
            })
        };
        let chain = MiddlewareChain::<Handler>::new().with(tag("initial"));
        let svc = Service::with_chain(mem.clone(), chain);
        let echo = || {
            handler_fn(|msg: Message| async move {
                let _ = msg.respond(Bytes::from("handler"), Headers::new());
            })
        };
        svc.add_endpoint("echo", echo(), EndpointOptions::new().subject("svc.echo"))
            .unwrap();
        assert_eq!(call(&mem, "svc.echo").await, "initial");

        let grp = svc.add_group("grp").use_context(mark("G"));
        grp.add_context_endpoint("trail", reply_trail(), EndpointOptions::new())
            .unwrap();
        assert_eq!(call(&mem, "grp.trail").await, "G");

        let bare = Service::new(mem.clone()).use_middleware(tag("alias"));
        bare.add_endpoint("other", echo(), EndpointOptions::new())
            .unwrap();
        assert_eq!(call(&mem, "other").await, "alias");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_contexts_are_isolated() {
        #[derive(Debug)]
        struct Caller(String);

        let mem = memory();
        let tag = from_fn(|next: ContextHandler| -> ContextHandler {
            Arc::new(
                move |req: Request| -> BoxFuture<'static, Result<(), HandlerError>> {
                    let caller = Caller(req.headers().get("caller").to_string());
                    next(req.with_context(req.context().with_value(caller)))
                },
            )
        });
        let svc = Service::new(mem.clone()).with_context_middleware(tag);
        let handler = context_handler_fn(|req: Request| async move {
            tokio::task::yield_now().await;
            let caller = req
                .context()
                .value::<Caller>()
                .map(|c| c.0.clone())
                .unwrap_or_default();
            req.respond(caller)?;
            Ok(())
        });
        svc.add_context_endpoint("who", handler, EndpointOptions::new())
            .unwrap();

        let calls = (0..32).map(|i| {
            let mem = mem.clone();
            tokio::spawn(async move {
                let mut headers = Headers::new();
                headers.set("caller", format!("caller-{i}"));
                let reply = mem.request("who", headers, "", TIMEOUT).await.unwrap();
                (i, reply.data)
            })
        });
        for call in futures::future::join_all(calls).await {
            let (i, data) = call.unwrap();
            assert_eq!(data, Bytes::from(format!("caller-{i}")));
        }
    }

    #[tokio::test]
    async fn test_error_after_reply_keeps_first_reply() {
        let mem = memory();
        let svc = Service::new(mem.clone());
        let handler = context_handler_fn(|req: Request| async move {
            req.respond("partial")?;
            Err(HandlerError::internal("too late"))
        });
        svc.add_context_endpoint("twice", handler, EndpointOptions::new())
            .unwrap();

        let reply = mem
            .request("twice", Headers::new(), Bytes::new(), TIMEOUT)
            .await
            .unwrap();
        assert!(!reply.is_error());
        assert_eq!(reply.data, Bytes::from("partial"));
        assert_eq!(svc.stats().endpoints[0].num_errors, 0);
    }

    #[tokio::test]
    async fn test_pass_through_surface() {
        let mem = memory();
        let svc = Service::new(mem.clone());
        svc.add_context_endpoint(
            "ep",
            reply_trail(),
            EndpointOptions::new().queue_group("q").metadata("k", "v"),
        )
        .unwrap();

        let info = svc.info();
        assert_eq!(info.config.name, "test");
        assert_eq!(info.endpoints[0].queue_group.as_deref(), Some("q"));
        assert_eq!(
            info.endpoints[0].metadata.get("k").map(String::as_str),
            Some("v")
        );

        call(&mem, "ep").await;
        assert_eq!(svc.stats().endpoints[0].num_requests, 1);
        svc.reset();
        assert_eq!(svc.stats().endpoints[0].num_requests, 0);

        assert!(!svc.stopped());
        svc.stop().unwrap();
        assert!(svc.stopped());
    }
}
