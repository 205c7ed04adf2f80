/// Views Example
///
/// This example demonstrates:
/// - Creating a filtered VirtualCollection over a Collection
/// - Giving a view its own ordering
/// - Stacking a view on top of another view
/// - Watching notifications as records are promoted and demoted
///
/// Run with `RUST_LOG=livecollection=debug` to see rebuilds and teardown.

use livecollection::{attrs, Collection, Event, EventName, FilterSpec, Source, ViewOptions, VirtualCollection};

fn print_names(label: &str, source: &dyn Source) {
    let names: Vec<String> = source
        .pluck("product")
        .into_iter()
        .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
        .collect();
    println!("   {}: {:?}", label, names);
}

fn main() {
    env_logger::init();
    println!("=== LiveCollection Views Example ===\n");

    // 1. Create a sales collection
    println!("1. Creating sales collection...");
    let sales = Collection::new("sales");
    let items = vec![
        ("Laptop", "Electronics", 999.99, 5),
        ("Mouse", "Electronics", 29.99, 20),
        ("Desk", "Furniture", 299.99, 3),
        ("Chair", "Furniture", 199.99, 8),
        ("Monitor", "Electronics", 399.99, 10),
    ];
    for (product, category, price, quantity) in items {
        sales
            .add(attrs! { "product" => product, "category" => category, "price" => price, "quantity" => quantity })
            .unwrap();
    }
    println!("   Added {} products\n", sales.len());

    // 2. Filtered view
    println!("2. Creating a view of Electronics...");
    let electronics = VirtualCollection::new(
        sales.clone(),
        ViewOptions::new()
            .name("electronics")
            .matching(attrs! { "category" => "Electronics" }),
    );
    print_names("electronics", &electronics);
    println!();

    // 3. Own ordering, stacked on the filtered view
    println!("3. Sorting electronics by price...");
    let by_price = VirtualCollection::new(electronics.clone(), ViewOptions::new().name("by_price").sorted_by("price"));
    print_names("by price", &by_price);
    println!();

    // 4. Predicate filter
    println!("4. Filtering high-stock items (quantity >= 10)...");
    let high_stock = VirtualCollection::new(
        sales.clone(),
        ViewOptions::new().filter(FilterSpec::predicate(|record, _| {
            record.get("quantity").and_then(|q| q.as_i64()).map_or(false, |q| q >= 10)
        })),
    );
    print_names("high stock", &high_stock);
    println!();

    // 5. Live updates
    println!("5. Watching the sorted view while the collection changes...");
    let _watch = by_price.on(|event: &Event| {
        println!(
            "   by_price: {} at {:?}",
            event.event_name(),
            event.index()
        );
    });

    sales
        .add(attrs! { "product" => "Keyboard", "category" => "Electronics", "price" => 79.99, "quantity" => 15 })
        .unwrap();

    let desk = sales.at(2).unwrap();
    sales.update(desk.id(), attrs! { "category" => "Electronics" }).unwrap();

    let mouse = sales.at(1).unwrap();
    sales.update(mouse.id(), attrs! { "category" => "Accessories" }).unwrap();

    print_names("by price", &by_price);
    print_names("high stock", &high_stock);
    println!();

    // 6. Teardown
    println!("6. Stopping the electronics view...");
    electronics.stop_listening();
    sales
        .add(attrs! { "product" => "Webcam", "category" => "Electronics", "price" => 59.99, "quantity" => 4 })
        .unwrap();
    println!("   Collection now has {} items", sales.len());
    println!("   Electronics view still shows {} items", electronics.len());

    println!("\n=== Example Complete ===");
}
