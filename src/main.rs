//! Driving an automation object through late binding
//!
//! The calculator from `axserver` is registered under a program id, created
//! through `AxObject::set_control` and then used only by name: its metadata
//! is generated from the type library it reports, properties and methods go
//! through `IDispatch::Invoke`, and its events arrive as signals.

use std::rc::Rc;

use axbridge::meta::{EXCEPTION_SIGNAL, PROPERTY_CHANGED_SIGNAL};
use axbridge::{AxObject, AxServices, Color, FactoryMap, MapRegistry, MetaObject, Value};
use axcom::IUnknown;
use axserver::calculator::{self, CLSID_CALCULATOR, IID_ICALC, IID_ICALCEVENTS};

const PROG_ID: &str = "CalcLib.Calculator";

fn services() -> AxServices {
    let mut registry = MapRegistry::new();
    registry.register_class(PROG_ID, &CLSID_CALCULATOR);
    registry.register_interface("ICalc", &IID_ICALC);
    registry.register_interface("ICalcEvents", &IID_ICALCEVENTS);

    let lib = calculator::library();
    let mut factory = FactoryMap::new();
    factory.register(CLSID_CALCULATOR, move || {
        calculator::create(&lib).and_then(|(object, _)| object.query::<IUnknown>())
    });
    AxServices::new(Rc::new(registry), Rc::new(factory))
}

fn print_meta(meta: &MetaObject) {
    println!("class {}", meta.class_name);
    for (key, value) in &meta.class_info {
        println!("  [{key}] {value}");
    }
    println!("slots:");
    for slot in meta.slots() {
        let ret = if slot.return_type.is_empty() { "void" } else { &slot.return_type };
        let cloned = if slot.cloned { " (cloned)" } else { "" };
        println!("  {ret} {}{cloned}", slot.signature);
    }
    println!("signals:");
    for signal in meta.signals() {
        println!("  {}", signal.signature);
    }
    println!("properties:");
    for property in &meta.properties {
        println!("  {} {} {:?}", property.type_name, property.name, property.flags);
    }
    println!("enums:");
    for meta_enum in &meta.enums {
        let keys: Vec<String> = meta_enum
            .keys
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        println!("  {} {{ {} }}", meta_enum.name, keys.join(", "));
    }
}

fn run() -> axbridge::Result<()> {
    let calc = AxObject::new(services());
    calc.set_control(PROG_ID)?;
    println!("created {} as {}\n", PROG_ID, calc.control());

    // =========================================================================
    // Generated metadata
    // =========================================================================
    print_meta(&calc.meta_object());
    println!("\nadvised on:");
    for iid in calc.connected_interfaces() {
        println!("  {}", iid.to_braced_string());
    }

    // =========================================================================
    // Signals
    // =========================================================================
    calc.connect("Computed(double)", |args| println!("  -> Computed({:?})", args[0]))?;
    calc.connect("Renamed(string)", |args| println!("  -> Renamed({:?})", args[0]))?;
    calc.connect("ColorChanged(color)", |args| println!("  -> ColorChanged({:?})", args[0]))?;
    calc.connect(PROPERTY_CHANGED_SIGNAL, |args| println!("  -> propertyChanged({:?})", args[0]))?;
    calc.connect(EXCEPTION_SIGNAL, |args| {
        println!("  -> exception {:?} from {:?}: {:?}", args[0], args[1], args[2]);
    })?;
    calc.connect("BeforeReset(bool&)", |args| {
        println!("  -> BeforeReset: cancelling");
        args[0] = Value::Bool(true);
    })?;

    // =========================================================================
    // Calls
    // =========================================================================
    println!("\n--- methods ---");
    let sum = calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(19), Value::Int(23)])?;
    println!("Add(19, 23) = {sum:?}");
    let inline = calc.dynamic_call("Add(1, 2)", &mut Vec::new())?;
    println!("Add(1, 2) written inline = {inline:?}");
    let scaled = calc.dynamic_call("Scale(double)", &mut vec![Value::Double(1.5)])?;
    println!("Scale(1.5) = {scaled:?}");

    let mut pair = vec![Value::Int(1), Value::Int(2)];
    calc.dynamic_call("Swap(int&,int&)", &mut pair)?;
    println!("Swap(1, 2) -> {pair:?}");

    if let Err(err) = calc.dynamic_call("Divide(double,double)", &mut vec![Value::Double(1.0), Value::Double(0.0)]) {
        println!("Divide(1, 0) failed: {err}");
    }

    println!("\n--- properties ---");
    calc.set_property("Name", Value::String("demo".into()))?;
    println!("Name = {:?}", calc.property("Name")?);
    calc.set_property("Mode", Value::String("Precise".into()))?;
    println!("Mode = {:?}", calc.property("Mode")?);
    calc.set_property("Color", Value::Color(Color::rgb(0x20, 0x40, 0x80)))?;
    println!("Items = {:?}", calc.property("Items")?);
    println!("Count = {:?}", calc.property("Count")?);

    calc.set_property_writable("Color", false);
    if let Err(err) = calc.set_property("Color", Value::Color(Color::rgb(0, 0, 0))) {
        println!("locked: {err}");
    }

    let reset = calc.dynamic_call("Reset()", &mut Vec::new())?;
    println!("Reset() = {reset:?}, Name is still {:?}", calc.property("Name")?);

    println!("\n--- documentation ---");
    let html = calc.generate_documentation();
    println!("{} bytes of HTML", html.len());

    calc.clear();
    println!("\ncleared, null = {}", calc.is_null());
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
