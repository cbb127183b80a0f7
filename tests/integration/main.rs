mod mock_orderbook;
mod simulation;
