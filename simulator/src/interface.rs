use std::io::{self, Write};

use crate::SimulatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationType {
    Simple,
    SweepDeliveryRate,
    Exit,
}

impl SimulationType {
    pub fn from_input(input: &str) -> Option<Self> {
        match input.trim() {
            "1" | "simple" => Some(SimulationType::Simple),
            "2" | "sweep_delivery_rate" => Some(SimulationType::SweepDeliveryRate),
            "0" | "exit" => Some(SimulationType::Exit),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct SimulatorInterface;

impl SimulatorInterface {
    pub fn new() -> Self {
        Self
    }

    pub fn get_menu_text(&self) -> &'static str {
        "Available simulation types:\n  1. Simple simulation\n  2. Sweep delivery rate\n  0. Exit"
    }

    pub fn show_menu(&self) {
        println!("=== PBFT Simulator ===");
        println!("{}", self.get_menu_text());
    }

    pub fn get_user_choice(&self) -> Result<Option<SimulationType>, SimulatorError> {
        print!("\nSelect simulation type (0-2): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(SimulationType::from_input(&input))
    }

    /// Run the scenario named by `simulation_type`
    pub async fn run(&self, simulation_type: SimulationType) -> Result<(), SimulatorError> {
        match simulation_type {
            SimulationType::Simple => {
                crate::run_simple_simulation(None).await?;
                println!("Simple simulation completed successfully!");
            }
            SimulationType::SweepDeliveryRate => {
                crate::run_sweep_delivery_rate_simulation(None).await?;
                println!("Delivery rate sweep completed successfully!");
            }
            SimulationType::Exit => println!("Exiting..."),
        }
        Ok(())
    }

    /// Prompt until a valid choice is made, then run it
    pub async fn run_interactive(&self) -> Result<(), SimulatorError> {
        self.show_menu();
        loop {
            match self.get_user_choice()? {
                Some(choice) => return self.run(choice).await,
                None => {
                    println!("Invalid choice. Please enter 1, 2, or 0 to exit.");
                    println!("{}", self.get_menu_text());
                }
            }
        }
    }
}
