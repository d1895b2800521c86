//! Service wiring shared by every handler.

use std::sync::Arc;

use cart::{CartService, CartStore, InMemoryCartStore, RedisCartStore};
use catalog::{
    CacheBackend, InMemoryCache, InMemoryProductStore, PostgresProductStore, ProductService,
    ProductStore, RedisCache,
};
use event_bus::{EventPublisher, RetryPolicy, TaskQueue};
use payment::{InMemoryPaymentStore, PaymentService, PaymentStore, PostgresPaymentStore};
use saga::{
    InMemoryIntentStore, InMemoryOrderStore, OrderService, OrderStore, PostgresIntentStore,
    PostgresOrderStore, SagaConfig, StockIntentStore, StockReconciler,
};

use crate::config::Config;

const TASK_QUEUE_CAPACITY: usize = 1024;

/// The storage types one deployment runs on.
pub trait Backend: Send + Sync + 'static {
    type Products: ProductStore + 'static;
    type Cache: CacheBackend + 'static;
    type Carts: CartStore + 'static;
    type Orders: OrderStore + 'static;
    type Intents: StockIntentStore + 'static;
    type Payments: PaymentStore + 'static;
}

/// Everything in process memory.
pub struct InMemoryBackend;

impl Backend for InMemoryBackend {
    type Products = InMemoryProductStore;
    type Cache = InMemoryCache;
    type Carts = InMemoryCartStore;
    type Orders = InMemoryOrderStore;
    type Intents = InMemoryIntentStore;
    type Payments = InMemoryPaymentStore;
}

/// PostgreSQL for the ledgers, Redis for cache and carts.
pub struct PersistentBackend;

impl Backend for PersistentBackend {
    type Products = PostgresProductStore;
    type Cache = RedisCache;
    type Carts = RedisCartStore;
    type Orders = PostgresOrderStore;
    type Intents = PostgresIntentStore;
    type Payments = PostgresPaymentStore;
}

pub type Catalog<B> = ProductService<<B as Backend>::Products, <B as Backend>::Cache>;
pub type Carts<B> = CartService<<B as Backend>::Carts, Arc<Catalog<B>>>;
pub type Orders<B> = OrderService<
    Arc<<B as Backend>::Orders>,
    Arc<<B as Backend>::Intents>,
    Arc<Catalog<B>>,
    Arc<Carts<B>>,
>;
pub type Payments<B> = PaymentService<<B as Backend>::Payments, Arc<Orders<B>>>;
pub type Reconciler<B> =
    StockReconciler<Arc<Catalog<B>>, Arc<<B as Backend>::Intents>, Arc<<B as Backend>::Orders>>;

/// The raw stores a backend is built from.
pub struct Stores<B: Backend> {
    pub products: B::Products,
    pub cache: B::Cache,
    pub carts: B::Carts,
    pub orders: B::Orders,
    pub intents: B::Intents,
    pub payments: B::Payments,
}

/// Shared application state accessible from all handlers.
pub struct AppState<B: Backend> {
    pub products: Arc<Catalog<B>>,
    pub carts: Arc<Carts<B>>,
    pub orders: Arc<Orders<B>>,
    pub payments: Arc<Payments<B>>,
    pub reconciler: Arc<Reconciler<B>>,
    pub tasks: TaskQueue,
}

impl<B: Backend> AppState<B> {
    /// Wires the services on top of the given stores.
    ///
    /// Spawns the background task queue, so this must run inside a Tokio
    /// runtime.
    pub fn new(stores: Stores<B>, publisher: Arc<dyn EventPublisher>, config: &Config) -> Arc<Self> {
        let tasks = TaskQueue::spawn(TASK_QUEUE_CAPACITY, RetryPolicy::default());
        let saga_config = SagaConfig::default();

        let products = Arc::new(ProductService::with_config(
            stores.products,
            stores.cache,
            config.cache,
        ));
        let carts = Arc::new(CartService::new(stores.carts, products.clone(), config.cart));

        let order_store = Arc::new(stores.orders);
        let intent_store = Arc::new(stores.intents);
        let orders = Arc::new(
            OrderService::new(
                order_store.clone(),
                intent_store.clone(),
                products.clone(),
                carts.clone(),
                publisher.clone(),
                tasks.clone(),
            )
            .with_config(saga_config),
        );
        let payments = Arc::new(
            PaymentService::new(stores.payments, orders.clone(), publisher.clone(), tasks.clone())
                .with_config(config.payment.clone()),
        );
        let reconciler = Arc::new(
            StockReconciler::new(products.clone(), intent_store, order_store, publisher)
                .with_config(saga_config),
        );

        Arc::new(Self {
            products,
            carts,
            orders,
            payments,
            reconciler,
            tasks,
        })
    }
}

impl AppState<InMemoryBackend> {
    /// Builds a state whose data lives only as long as the process.
    pub fn in_memory(publisher: Arc<dyn EventPublisher>, config: &Config) -> Arc<Self> {
        Self::new(
            Stores {
                products: InMemoryProductStore::new(),
                cache: InMemoryCache::new(),
                carts: InMemoryCartStore::new(config.cart),
                orders: InMemoryOrderStore::new(),
                intents: InMemoryIntentStore::new(),
                payments: InMemoryPaymentStore::new(),
            },
            publisher,
            config,
        )
    }
}

impl AppState<PersistentBackend> {
    /// Connects to PostgreSQL and Redis, applying pending migrations first.
    pub async fn connect(
        database_url: &str,
        redis_url: &str,
        publisher: Arc<dyn EventPublisher>,
        config: &Config,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        tracing::info!("database migrations applied");

        let cache = RedisCache::connect(redis_url).await?;
        let carts = RedisCartStore::connect(redis_url, config.cart).await?;

        Ok(Self::new(
            Stores {
                products: PostgresProductStore::new(pool.clone()),
                cache,
                carts,
                orders: PostgresOrderStore::new(pool.clone()),
                intents: PostgresIntentStore::new(pool.clone()),
                payments: PostgresPaymentStore::new(pool),
            },
            publisher,
            config,
        ))
    }
}
